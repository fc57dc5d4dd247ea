//! Connection manager: state machine, heartbeat monitoring, and automatic
//! reconnection for a single logical P2P session
//!
//! All transitions are serialized through one actor task per manager
//! instance: user operations arrive as commands over an mpsc channel, retry
//! timers post back into the actor with the episode they belong to, and the
//! actor is the only mutator of state, peer info, and reconnection status.
//! Observers get snapshots: the state and peer streams are `watch` channels
//! (replay the latest value to new subscribers), the event stream is a
//! `broadcast` channel (late subscribers miss past events).

use crate::config::ManagerConfig;
use crate::error::{ConnectionError, TransportError};
use crate::event::ConnectionEvent;
use crate::heartbeat::HeartbeatMonitor;
use crate::state::{is_valid_transition, ConnectionState, PeerInfo, ReconnectionStatus};
use crate::transport::{Transport, TransportSession};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// User-facing handle to a connection actor.
///
/// Cheap to clone-by-parts via the observer methods; the actor shuts down
/// once the handle is dropped.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    peer_rx: watch::Receiver<Option<PeerInfo>>,
    reconnect_rx: watch::Receiver<Option<ReconnectionStatus>>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    inbound_tx: broadcast::Sender<Bytes>,
}

impl ConnectionManager {
    /// Create a manager over the given transport and spawn its actor task.
    ///
    /// The transport is exclusively owned by the manager from here on.
    pub fn new(transport: Arc<dyn Transport>, config: ManagerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (peer_tx, peer_rx) = watch::channel(None);
        let (reconnect_tx, reconnect_rx) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(config.channel_capacity);
        let (inbound_tx, _) = broadcast::channel(config.channel_capacity);

        let actor = Actor {
            transport,
            auto_reconnect: config.auto_reconnect,
            config,
            cmd_rx,
            timer_tx,
            timer_rx,
            state_tx,
            peer_tx,
            reconnect_tx,
            events_tx: events_tx.clone(),
            inbound_tx: inbound_tx.clone(),
            episode: 0,
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            state_rx,
            peer_rx,
            reconnect_rx,
            events_tx,
            inbound_tx,
        }
    }

    /// Establish a session with the peer.
    ///
    /// `Connected` is published on the state stream before the returned
    /// future resolves. Fails with [`ConnectionError::AlreadyConnected`] if
    /// a session with a different peer is active or being recovered; a call
    /// naming the peer of an in-progress reconnection is an idempotent
    /// no-op. Initial failures are not auto-retried.
    pub async fn connect(
        &self,
        peer_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        let peer_id = peer_id.into();
        if peer_id.is_empty() {
            return Err(ConnectionError::InvalidPeerId);
        }
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect {
                peer_id,
                credential: credential.into(),
                reply,
            })
            .map_err(|_| ConnectionError::Closed)?;
        rx.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Tear down the session or abandon an in-progress reconnection.
    ///
    /// Safe from any state and idempotent; returns once the actor has
    /// applied it, so no retry scheduled before this call can fire after it.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Enable or disable automatic reconnection for future losses.
    ///
    /// Does not cancel an episode that is already running.
    pub async fn set_auto_reconnect(&self, enabled: bool) {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::SetAutoReconnect { enabled, reply })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Abandon the current reconnection episode, moving to `Disconnected`.
    /// No-op outside `Reconnecting`.
    pub async fn cancel_reconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::CancelReconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Send a payload over the active session.
    ///
    /// A non-fatal transport failure is returned without touching the
    /// connection state; a fatal one is returned and also starts the loss
    /// handling path.
    pub async fn send(&self, payload: Bytes) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { payload, reply })
            .map_err(|_| ConnectionError::Closed)?;
        rx.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Current peer snapshot; `Some` exactly while `Connected`.
    pub fn peer(&self) -> Option<PeerInfo> {
        self.peer_rx.borrow().clone()
    }

    /// Current reconnection snapshot; `Some` exactly while `Reconnecting`.
    pub fn reconnection_status(&self) -> Option<ReconnectionStatus> {
        self.reconnect_rx.borrow().clone()
    }

    /// State stream. Replays the current value to new subscribers.
    pub fn observe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Peer stream. Replays the current value to new subscribers.
    pub fn observe_peer(&self) -> watch::Receiver<Option<PeerInfo>> {
        self.peer_rx.clone()
    }

    /// Event stream. No replay: a subscriber joining late misses past
    /// events. State is authoritative; events are best-effort
    /// notifications.
    pub fn observe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// Inbound payloads pushed by the peer on the active session.
    pub fn observe_inbound(&self) -> broadcast::Receiver<Bytes> {
        self.inbound_tx.subscribe()
    }
}

enum Command {
    Connect {
        peer_id: String,
        credential: String,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    SetAutoReconnect {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    CancelReconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: Bytes,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
}

/// What the actor is doing between commands.
enum Phase {
    /// Disconnected or Error: nothing running, waiting for `connect()`.
    Idle,
    /// A live session with its inbound stream and liveness monitor.
    Online {
        session: Box<dyn TransportSession>,
        inbound: mpsc::Receiver<Bytes>,
        peer_id: String,
        credential: String,
    },
    /// Between reconnection attempts, waiting for the armed retry timer.
    Backoff {
        peer_id: String,
        credential: String,
        attempt: u32,
    },
}

/// Why an established session ended without an explicit `disconnect()`.
enum Loss {
    HeartbeatTimeout { last_received_at: Instant },
    UnexpectedClose,
    FatalSend { message: String },
}

/// Result of driving a transport open with command preemption.
enum OpenOutcome {
    Opened(Box<dyn TransportSession>, mpsc::Receiver<Bytes>),
    Failed(TransportError),
    TimedOut(Duration),
    /// `disconnect()` arrived mid-open. The ack is sent by the caller once
    /// the state has settled, so `disconnect()` never resolves early.
    AbortedDisconnect(oneshot::Sender<()>),
    /// `cancel_reconnect()` arrived mid-attempt (reconnecting only); ack
    /// deferred as above.
    AbortedCancel(oneshot::Sender<()>),
    Shutdown,
}

struct Actor {
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Retry timers post their episode here when they fire.
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    state_tx: watch::Sender<ConnectionState>,
    peer_tx: watch::Sender<Option<PeerInfo>>,
    reconnect_tx: watch::Sender<Option<ReconnectionStatus>>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    inbound_tx: broadcast::Sender<Bytes>,
    auto_reconnect: bool,
    /// Generation counter for reconnection episodes. Bumped on every
    /// episode start and cancellation; a timer firing with a stale episode
    /// is discarded, so a delayed callback from a previous episode can
    /// never resurrect a newer one.
    episode: u64,
}

impl Actor {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            let next = match phase {
                Phase::Idle => self.run_idle().await,
                Phase::Online {
                    session,
                    inbound,
                    peer_id,
                    credential,
                } => self.run_online(session, inbound, peer_id, credential).await,
                Phase::Backoff {
                    peer_id,
                    credential,
                    attempt,
                } => self.run_backoff(peer_id, credential, attempt).await,
            };
            match next {
                Some(p) => phase = p,
                None => {
                    info!("connection manager shut down");
                    return;
                }
            }
        }
    }

    /// Disconnected / Error: only `connect()` does anything.
    async fn run_idle(&mut self) -> Option<Phase> {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    let cmd = maybe_cmd?;
                    match cmd {
                        Command::Connect { peer_id, credential, reply } => {
                            return self.handle_connect(peer_id, credential, reply).await;
                        }
                        Command::Disconnect { reply } => {
                            // Idempotent; an Error state is cleared back to
                            // Disconnected without further events
                            if self.state() != ConnectionState::Disconnected {
                                self.set_state(ConnectionState::Disconnected);
                            }
                            let _ = reply.send(());
                        }
                        Command::SetAutoReconnect { enabled, reply } => {
                            self.auto_reconnect = enabled;
                            let _ = reply.send(());
                        }
                        Command::CancelReconnect { reply } => {
                            let _ = reply.send(());
                        }
                        Command::Send { reply, .. } => {
                            let _ = reply.send(Err(ConnectionError::NotConnected));
                        }
                    }
                }
                Some(_) = self.timer_rx.recv() => {
                    // Stale retry timer from a cancelled episode
                }
            }
        }
    }

    async fn handle_connect(
        &mut self,
        peer_id: String,
        credential: String,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    ) -> Option<Phase> {
        self.set_state(ConnectionState::Connecting);
        info!(peer_id = %peer_id, "connecting");

        match self
            .open_guarded(&peer_id, &credential, self.config.connect_timeout, false)
            .await
        {
            OpenOutcome::Opened(session, inbound) => {
                self.install_peer(&peer_id, &credential);
                self.set_state(ConnectionState::Connected);
                self.emit(ConnectionEvent::Connected);
                info!(peer_id = %peer_id, "connected");
                let _ = reply.send(Ok(()));
                Some(Phase::Online {
                    session,
                    inbound,
                    peer_id,
                    credential,
                })
            }
            OpenOutcome::Failed(e) => {
                warn!(peer_id = %peer_id, error = %e, "connect failed");
                self.set_state(ConnectionState::Error);
                self.emit(ConnectionEvent::Error {
                    message: e.to_string(),
                });
                let _ = reply.send(Err(ConnectionError::OpenFailed(e)));
                Some(Phase::Idle)
            }
            OpenOutcome::TimedOut(after) => {
                warn!(peer_id = %peer_id, ?after, "connect timed out");
                self.set_state(ConnectionState::Error);
                self.emit(ConnectionEvent::Error {
                    message: format!("connect timed out after {after:?}"),
                });
                let _ = reply.send(Err(ConnectionError::ConnectTimeout(after)));
                Some(Phase::Idle)
            }
            OpenOutcome::AbortedDisconnect(ack) | OpenOutcome::AbortedCancel(ack) => {
                self.set_state(ConnectionState::Disconnected);
                let _ = reply.send(Err(ConnectionError::Cancelled));
                let _ = ack.send(());
                Some(Phase::Idle)
            }
            OpenOutcome::Shutdown => {
                let _ = reply.send(Err(ConnectionError::Closed));
                None
            }
        }
    }

    /// Connected: pump inbound traffic, poll liveness, serve commands.
    async fn run_online(
        &mut self,
        mut session: Box<dyn TransportSession>,
        mut inbound: mpsc::Receiver<Bytes>,
        peer_id: String,
        credential: String,
    ) -> Option<Phase> {
        let mut monitor = HeartbeatMonitor::new(self.config.heartbeat_timeout);
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        session.close().await;
                        return None;
                    };
                    match cmd {
                        Command::Disconnect { reply } => {
                            session.close().await;
                            self.episode += 1;
                            self.peer_tx.send_replace(None);
                            self.set_state(ConnectionState::Disconnected);
                            self.emit(ConnectionEvent::Disconnected);
                            info!(peer_id = %peer_id, "disconnected");
                            let _ = reply.send(());
                            return Some(Phase::Idle);
                        }
                        Command::Connect { peer_id: requested, reply, .. } => {
                            if requested == peer_id {
                                let _ = reply.send(Ok(()));
                            } else {
                                let _ = reply.send(Err(
                                    ConnectionError::AlreadyConnected(peer_id.clone()),
                                ));
                            }
                        }
                        Command::SetAutoReconnect { enabled, reply } => {
                            self.auto_reconnect = enabled;
                            let _ = reply.send(());
                        }
                        Command::CancelReconnect { reply } => {
                            let _ = reply.send(());
                        }
                        Command::Send { payload, reply } => {
                            match session.send(payload).await {
                                Ok(()) => {
                                    let _ = reply.send(Ok(()));
                                }
                                Err(e) if e.is_fatal() => {
                                    let message = e.to_string();
                                    let _ = reply.send(Err(ConnectionError::Transport(e)));
                                    session.close().await;
                                    return Some(self.on_connection_lost(
                                        Loss::FatalSend { message },
                                        peer_id,
                                        credential,
                                    ));
                                }
                                Err(e) => {
                                    // Transient: caller learns, state keeps
                                    let _ = reply.send(Err(ConnectionError::Transport(e)));
                                }
                            }
                        }
                    }
                }
                maybe_payload = inbound.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            // Any inbound traffic counts as liveness
                            monitor.touch();
                            let _ = self.inbound_tx.send(payload);
                        }
                        None => {
                            session.close().await;
                            return Some(self.on_connection_lost(
                                Loss::UnexpectedClose,
                                peer_id,
                                credential,
                            ));
                        }
                    }
                }
                _ = ticker.tick() => {
                    if monitor.is_timed_out(Instant::now()) {
                        session.close().await;
                        return Some(self.on_connection_lost(
                            Loss::HeartbeatTimeout {
                                last_received_at: monitor.last_received_at(),
                            },
                            peer_id,
                            credential,
                        ));
                    }
                }
                Some(_) = self.timer_rx.recv() => {
                    // Stale retry timer from a cancelled episode
                }
            }
        }
    }

    /// A session ended without `disconnect()`. Fires exactly once per loss:
    /// the monitor lives only in the online phase, so it cannot re-trigger
    /// while a reconnection is running.
    fn on_connection_lost(&mut self, loss: Loss, peer_id: String, credential: String) -> Phase {
        match loss {
            Loss::HeartbeatTimeout { last_received_at } => {
                warn!(peer_id = %peer_id, "heartbeat timeout, connection lost");
                self.emit(ConnectionEvent::HeartbeatTimeout { last_received_at });
            }
            Loss::UnexpectedClose => {
                warn!(peer_id = %peer_id, "transport closed unexpectedly");
                self.emit(ConnectionEvent::Error {
                    message: "transport closed unexpectedly".into(),
                });
            }
            Loss::FatalSend { message } => {
                warn!(peer_id = %peer_id, error = %message, "fatal transport error");
                self.emit(ConnectionEvent::Error { message });
            }
        }
        self.peer_tx.send_replace(None);

        if !self.auto_reconnect {
            self.set_state(ConnectionState::Error);
            return Phase::Idle;
        }

        self.set_state(ConnectionState::Reconnecting);
        self.episode += 1;
        self.schedule_attempt(1);
        Phase::Backoff {
            peer_id,
            credential,
            attempt: 1,
        }
    }

    /// Reconnecting: wait for the armed timer, drive attempts, serve
    /// commands.
    async fn run_backoff(
        &mut self,
        peer_id: String,
        credential: String,
        mut attempt: u32,
    ) -> Option<Phase> {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    let cmd = maybe_cmd?;
                    match cmd {
                        Command::Disconnect { reply } => {
                            self.end_episode(ConnectionState::Disconnected);
                            self.emit(ConnectionEvent::Disconnected);
                            let _ = reply.send(());
                            return Some(Phase::Idle);
                        }
                        Command::CancelReconnect { reply } => {
                            info!(peer_id = %peer_id, "reconnection cancelled");
                            self.end_episode(ConnectionState::Disconnected);
                            let _ = reply.send(());
                            return Some(Phase::Idle);
                        }
                        Command::Connect { peer_id: requested, reply, .. } => {
                            if requested == peer_id {
                                // Episode already recovering this peer
                                let _ = reply.send(Ok(()));
                            } else {
                                let _ = reply.send(Err(
                                    ConnectionError::AlreadyConnected(peer_id.clone()),
                                ));
                            }
                        }
                        Command::SetAutoReconnect { enabled, reply } => {
                            // Non-retroactive: the running episode continues
                            self.auto_reconnect = enabled;
                            let _ = reply.send(());
                        }
                        Command::Send { reply, .. } => {
                            let _ = reply.send(Err(ConnectionError::NotConnected));
                        }
                    }
                }
                Some(episode) = self.timer_rx.recv() => {
                    if episode != self.episode {
                        continue;
                    }
                    match self.drive_attempt(&peer_id, &credential, attempt).await {
                        AttemptOutcome::Recovered(session, inbound) => {
                            return Some(Phase::Online { session, inbound, peer_id, credential });
                        }
                        AttemptOutcome::Retry => {
                            attempt += 1;
                        }
                        AttemptOutcome::GaveUp => return Some(Phase::Idle),
                        AttemptOutcome::Cancelled => return Some(Phase::Idle),
                        AttemptOutcome::Shutdown => return None,
                    }
                }
            }
        }
    }

    async fn drive_attempt(
        &mut self,
        peer_id: &str,
        credential: &str,
        attempt: u32,
    ) -> AttemptOutcome {
        self.emit(ConnectionEvent::ReconnectAttempting { attempt });
        info!(peer_id = %peer_id, attempt, "reconnect attempt");

        let outcome = self
            .open_guarded(peer_id, credential, self.config.attempt_timeout, true)
            .await;

        let failure = match outcome {
            OpenOutcome::Opened(session, inbound) => {
                self.reconnect_tx.send_replace(None);
                self.install_peer(peer_id, credential);
                self.set_state(ConnectionState::Connected);
                self.emit(ConnectionEvent::ReconnectSuccess {
                    total_attempts: attempt,
                });
                info!(peer_id = %peer_id, total_attempts = attempt, "reconnected");
                self.episode += 1;
                return AttemptOutcome::Recovered(session, inbound);
            }
            OpenOutcome::Failed(e) => e.to_string(),
            OpenOutcome::TimedOut(after) => format!("attempt timed out after {after:?}"),
            OpenOutcome::AbortedDisconnect(ack) => {
                self.end_episode(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::Disconnected);
                let _ = ack.send(());
                return AttemptOutcome::Cancelled;
            }
            OpenOutcome::AbortedCancel(ack) => {
                info!(peer_id = %peer_id, "reconnection cancelled mid-attempt");
                self.end_episode(ConnectionState::Disconnected);
                let _ = ack.send(());
                return AttemptOutcome::Cancelled;
            }
            OpenOutcome::Shutdown => return AttemptOutcome::Shutdown,
        };

        warn!(peer_id = %peer_id, attempt, reason = %failure, "reconnect attempt failed");
        let next = attempt + 1;
        if self.config.reconnect.has_attempts_left(next) {
            self.schedule_attempt(next);
            AttemptOutcome::Retry
        } else {
            error!(peer_id = %peer_id, attempts = attempt, "reconnection exhausted");
            self.reconnect_tx.send_replace(None);
            self.set_state(ConnectionState::Error);
            self.emit(ConnectionEvent::ReconnectFailed { reason: failure });
            self.episode += 1;
            AttemptOutcome::GaveUp
        }
    }

    /// Arm the retry timer for a 1-based attempt and publish the pending
    /// status.
    fn schedule_attempt(&mut self, attempt: u32) {
        let delay = self.config.reconnect.next_delay(attempt);
        self.reconnect_tx.send_replace(Some(ReconnectionStatus {
            attempt,
            next_delay: delay,
            max_attempts: self.config.reconnect.max_attempts,
        }));
        self.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });
        info!(attempt, ?delay, "reconnect scheduled");

        let episode = self.episode;
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timer_tx.send(episode);
        });
    }

    /// Drive a transport open while still serving commands, bounded by a
    /// timeout. Dropping the open future aborts it.
    async fn open_guarded(
        &mut self,
        peer_id: &str,
        credential: &str,
        bound: Duration,
        reconnecting: bool,
    ) -> OpenOutcome {
        let transport = Arc::clone(&self.transport);
        let peer = peer_id.to_string();
        let cred = credential.to_string();
        let open = async move { transport.open(&peer, &cred).await };
        tokio::pin!(open);
        let deadline = Instant::now() + bound;

        loop {
            tokio::select! {
                result = &mut open => {
                    return match result {
                        Ok((session, inbound)) => OpenOutcome::Opened(session, inbound),
                        Err(e) => OpenOutcome::Failed(e),
                    };
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return OpenOutcome::TimedOut(bound);
                }
                maybe_cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        return OpenOutcome::Shutdown;
                    };
                    match cmd {
                        Command::Disconnect { reply } => {
                            return OpenOutcome::AbortedDisconnect(reply);
                        }
                        Command::CancelReconnect { reply } => {
                            if reconnecting {
                                return OpenOutcome::AbortedCancel(reply);
                            }
                            // No-op outside a reconnection episode
                            let _ = reply.send(());
                        }
                        Command::Connect { peer_id: requested, reply, .. } => {
                            if reconnecting && requested == peer_id {
                                let _ = reply.send(Ok(()));
                            } else {
                                let _ = reply.send(Err(
                                    ConnectionError::AlreadyConnected(peer_id.to_string()),
                                ));
                            }
                        }
                        Command::SetAutoReconnect { enabled, reply } => {
                            self.auto_reconnect = enabled;
                            let _ = reply.send(());
                        }
                        Command::Send { reply, .. } => {
                            let _ = reply.send(Err(ConnectionError::NotConnected));
                        }
                    }
                }
            }
        }
    }

    /// Cancel the running episode and settle into `to`.
    fn end_episode(&mut self, to: ConnectionState) {
        self.episode += 1;
        self.reconnect_tx.send_replace(None);
        self.set_state(to);
    }

    fn install_peer(&mut self, peer_id: &str, credential: &str) {
        self.peer_tx.send_replace(Some(PeerInfo {
            peer_id: peer_id.to_string(),
            peer_identity: credential.to_string(),
            connected_at: Instant::now(),
        }));
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state();
        debug_assert!(
            is_valid_transition(prev, next),
            "invalid transition {prev} -> {next}"
        );
        if prev != next {
            info!(from = %prev, to = %next, "state changed");
        }
        self.state_tx.send_replace(next);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine; events are best-effort notifications
        let _ = self.events_tx.send(event);
    }
}

enum AttemptOutcome {
    Recovered(Box<dyn TransportSession>, mpsc::Receiver<Bytes>),
    Retry,
    GaveUp,
    Cancelled,
    Shutdown,
}
