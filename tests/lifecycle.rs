//! Lifecycle tests for the connection manager over a scripted fake
//! transport, driven under paused tokio time so timers are deterministic.

use async_trait::async_trait;
use bytes::Bytes;
use peerlink::transport::OpenedSession;
use peerlink::{
    ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState, ManagerConfig,
    ReconnectPolicy, Transport, TransportError, TransportSession,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Transport whose open/send outcomes are scripted by the test. The test
/// side can push inbound payloads and drop the link to simulate peer
/// traffic and unexpected closes.
#[derive(Clone, Default)]
struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Outcomes for successive `open()` calls; empty means succeed.
    open_results: VecDeque<Result<(), TransportError>>,
    /// Outcomes for successive `send()` calls; empty means succeed.
    send_results: VecDeque<Result<(), TransportError>>,
    /// Number of upcoming `open()` calls that never resolve.
    hang_opens: u32,
    opens: u32,
    link: Option<mpsc::Sender<Bytes>>,
    sent: Vec<Bytes>,
}

impl FakeTransport {
    fn fail_next_opens(&self, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            inner
                .open_results
                .push_back(Err(TransportError::fatal("open refused")));
        }
    }

    /// Make the next `count` opens hang until the manager aborts them.
    fn hang_next_opens(&self, count: u32) {
        self.inner.lock().unwrap().hang_opens += count;
    }

    fn queue_send_result(&self, result: Result<(), TransportError>) {
        self.inner.lock().unwrap().send_results.push_back(result);
    }

    fn push_inbound(&self, payload: &'static [u8]) {
        let inner = self.inner.lock().unwrap();
        inner
            .link
            .as_ref()
            .expect("no open link")
            .try_send(Bytes::from_static(payload))
            .expect("inbound channel full");
    }

    /// Simulate the underlying link dropping unexpectedly.
    fn drop_link(&self) {
        self.inner.lock().unwrap().link = None;
    }

    fn opens(&self) -> u32 {
        self.inner.lock().unwrap().opens
    }

    fn sent(&self) -> Vec<Bytes> {
        self.inner.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(
        &self,
        _peer_id: &str,
        _credential: &str,
    ) -> Result<OpenedSession, TransportError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.opens += 1;
            if inner.hang_opens > 0 {
                inner.hang_opens -= 1;
                true
            } else {
                false
            }
        };
        if hang {
            // Only the manager dropping this future ends it
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(result) = inner.open_results.pop_front() {
            result?;
        }
        let (link_tx, link_rx) = mpsc::channel(16);
        inner.link = Some(link_tx);
        let session = FakeSession {
            inner: Arc::clone(&self.inner),
        };
        Ok((Box::new(session), link_rx))
    }
}

struct FakeSession {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(result) = inner.send_results.pop_front() {
            result?;
        }
        inner.sent.push(payload);
        Ok(())
    }

    async fn close(&mut self) {}
}

fn test_config(max_attempts: u32) -> ManagerConfig {
    ManagerConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts,
        },
        ..ManagerConfig::default()
    }
}

fn setup(config: ManagerConfig) -> (FakeTransport, ConnectionManager) {
    let transport = FakeTransport::default();
    let manager = ConnectionManager::new(Arc::new(transport.clone()), config);
    (transport, manager)
}

async fn next_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn drain_events(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_connect_publishes_connected_before_result() {
    let (_transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");

    // State and peer info are already observable when connect resolves
    assert_eq!(manager.state(), ConnectionState::Connected);
    let peer = manager.peer().expect("peer info missing");
    assert_eq!(peer.peer_id, "peer-a");
    assert_eq!(peer.peer_identity, "did:key:a");
    assert!(manager.reconnection_status().is_none());

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_empty_peer_id_is_rejected() {
    let (transport, manager) = setup(test_config(3));
    let err = manager.connect("", "did:key:a").await.expect_err("should reject");
    assert!(matches!(err, ConnectionError::InvalidPeerId));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(transport.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initial_connect_failure_is_not_retried() {
    let (transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();
    transport.fail_next_opens(1);

    let err = manager.connect("peer-a", "did:key:a").await.expect_err("should fail");
    assert!(matches!(err, ConnectionError::OpenFailed(_)));
    assert_eq!(manager.state(), ConnectionState::Error);
    assert!(manager.peer().is_none());

    // No backoff loop for initial failures
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), 1);

    let seen = drain_events(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], ConnectionEvent::Error { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_lands_in_error() {
    let (transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();
    transport.hang_next_opens(1);

    let err = manager.connect("peer-a", "did:key:a").await.expect_err("should time out");
    assert!(matches!(err, ConnectionError::ConnectTimeout(_)));
    assert_eq!(manager.state(), ConnectionState::Error);
    assert!(manager.peer().is_none());

    // A timed-out initial connect is not retried either
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), 1);

    let seen = drain_events(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], ConnectionEvent::Error { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_open_cancels_connect() {
    let (transport, manager) = setup(test_config(3));
    transport.hang_next_opens(1);

    let manager = Arc::new(manager);
    let handle = Arc::clone(&manager);
    let pending = tokio::spawn(async move { handle.connect("peer-a", "did:key:a").await });

    let mut states = manager.observe_state();
    states
        .wait_for(|s| *s == ConnectionState::Connecting)
        .await
        .expect("state stream closed");

    // When disconnect resolves the state must already be settled
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let result = pending.await.expect("connect task panicked");
    assert!(matches!(result, Err(ConnectionError::Cancelled)));
    assert_eq!(transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_to_different_peer_fails() {
    let (_transport, manager) = setup(test_config(3));
    manager.connect("peer-a", "did:key:a").await.expect("connect failed");

    let err = manager.connect("peer-b", "did:key:b").await.expect_err("should refuse");
    match err {
        ConnectionError::AlreadyConnected(peer) => assert_eq!(peer, "peer-a"),
        other => panic!("unexpected error: {other:?}"),
    }

    // Same peer is an idempotent no-op
    manager.connect("peer-a", "did:key:a").await.expect("idempotent connect failed");
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let (_transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();

    manager.disconnect().await;
    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(drain_events(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_drives_episode_to_success() {
    let (transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    // Peer goes silent: attempts 1 and 2 fail, attempt 3 recovers
    transport.fail_next_opens(2);

    match next_event(&mut events).await {
        ConnectionEvent::HeartbeatTimeout { .. } => {}
        other => panic!("expected heartbeat timeout, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    assert!(manager.peer().is_none());

    let mut scheduled = Vec::new();
    let mut attempting = Vec::new();
    loop {
        match next_event(&mut events).await {
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                scheduled.push((attempt, delay));
                let status = manager.reconnection_status().expect("status missing");
                assert_eq!(status.attempt, attempt);
                assert_eq!(status.max_attempts, 3);
            }
            ConnectionEvent::ReconnectAttempting { attempt } => attempting.push(attempt),
            ConnectionEvent::ReconnectSuccess { total_attempts } => {
                assert_eq!(total_attempts, 3);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // Attempts strictly increasing from 1
    assert_eq!(scheduled.iter().map(|(a, _)| *a).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(attempting, vec![1, 2, 3]);

    // Jittered delays stay within ±20% of 1s, 2s, 4s
    for (attempt, delay) in &scheduled {
        let base = Duration::from_secs(1 << (attempt - 1));
        assert!(*delay >= base.mul_f64(0.8), "attempt {attempt}: {delay:?} too short");
        assert!(*delay <= base.mul_f64(1.2), "attempt {attempt}: {delay:?} too long");
    }

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(manager.peer().is_some());
    assert!(manager.reconnection_status().is_none());
    assert_eq!(transport.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_is_terminal_until_explicit_connect() {
    let (transport, manager) = setup(test_config(2));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    transport.fail_next_opens(2);
    transport.drop_link();

    // Unexpected close surfaces as an error event, then the episode runs
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error { .. }));

    let mut failed = 0;
    loop {
        match next_event(&mut events).await {
            ConnectionEvent::ReconnectScheduled { .. } | ConnectionEvent::ReconnectAttempting { .. } => {}
            ConnectionEvent::ReconnectFailed { .. } => {
                failed += 1;
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(manager.state(), ConnectionState::Error);
    assert!(manager.reconnection_status().is_none());
    assert!(manager.peer().is_none());

    // Exactly one terminal event, and nothing further without connect()
    tokio::time::sleep(Duration::from_secs(120)).await;
    for event in drain_events(&mut events) {
        if matches!(event, ConnectionEvent::ReconnectFailed { .. }) {
            failed += 1;
        }
    }
    assert_eq!(failed, 1);
    assert_eq!(transport.opens(), 3);

    // Error state is recoverable via an explicit connect
    manager.connect("peer-a", "did:key:a").await.expect("reconnect failed");
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let (transport, manager) = setup(test_config(5));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    transport.drop_link();
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error { .. }));
    match next_event(&mut events).await {
        ConnectionEvent::ReconnectScheduled { attempt: 1, .. } => {}
        other => panic!("expected first schedule, got {other:?}"),
    }

    // Disconnect before the armed timer elapses
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.reconnection_status().is_none());

    // The stale timer must not resurrect the episode
    tokio::time::sleep(Duration::from_secs(120)).await;
    for event in drain_events(&mut events) {
        assert!(
            !matches!(event, ConnectionEvent::ReconnectAttempting { .. }),
            "retry fired after disconnect"
        );
    }
    assert_eq!(transport.opens(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_attempt_counts_as_failure() {
    let (transport, manager) = setup(test_config(2));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    // Attempt 1 hangs until its per-attempt timeout; attempt 2 recovers
    transport.hang_next_opens(1);
    transport.drop_link();

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error { .. }));

    let mut scheduled = Vec::new();
    loop {
        match next_event(&mut events).await {
            ConnectionEvent::ReconnectScheduled { attempt, .. } => scheduled.push(attempt),
            ConnectionEvent::ReconnectAttempting { .. } => {}
            ConnectionEvent::ReconnectSuccess { total_attempts } => {
                assert_eq!(total_attempts, 2);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(scheduled, vec![1, 2]);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(transport.opens(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_reconnect_mid_attempt_settles_disconnected() {
    let (transport, manager) = setup(test_config(5));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    transport.hang_next_opens(1);
    transport.drop_link();

    loop {
        if let ConnectionEvent::ReconnectAttempting { attempt: 1 } = next_event(&mut events).await {
            break;
        }
    }

    // The open for attempt 1 is still pending when the cancel lands
    manager.cancel_reconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.reconnection_status().is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), 2);
    for event in drain_events(&mut events) {
        assert!(!matches!(event, ConnectionEvent::ReconnectAttempting { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_reconnect_settles_disconnected() {
    let (transport, manager) = setup(test_config(5));
    let mut events = manager.observe_events();

    // No-op outside an episode
    manager.cancel_reconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    transport.drop_link();

    loop {
        if let ConnectionEvent::ReconnectScheduled { .. } = next_event(&mut events).await {
            break;
        }
    }
    manager.cancel_reconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.reconnection_status().is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    for event in drain_events(&mut events) {
        assert!(!matches!(event, ConnectionEvent::ReconnectAttempting { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled_moves_to_error() {
    let (transport, manager) = setup(test_config(5));
    let mut events = manager.observe_events();

    manager.set_auto_reconnect(false).await;
    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    transport.drop_link();
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error { .. }));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(manager.state(), ConnectionState::Error);
    assert!(manager.peer().is_none());
    assert_eq!(transport.opens(), 1);
    for event in drain_events(&mut events) {
        assert!(!matches!(event, ConnectionEvent::ReconnectScheduled { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_nonfatal_send_error_keeps_connection() {
    let (transport, manager) = setup(test_config(3));

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");

    transport.queue_send_result(Err(TransportError::transient("queue full")));
    let err = manager.send(Bytes::from_static(b"item")).await.expect_err("should fail");
    assert!(matches!(err, ConnectionError::Transport(_)));
    assert_eq!(manager.state(), ConnectionState::Connected);

    // The link still works
    manager.send(Bytes::from_static(b"item")).await.expect("send failed");
    assert_eq!(transport.sent(), vec![Bytes::from_static(b"item")]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_send_error_starts_reconnection() {
    let (transport, manager) = setup(test_config(3));
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Connected));

    transport.queue_send_result(Err(TransportError::fatal("broken pipe")));
    let err = manager.send(Bytes::from_static(b"item")).await.expect_err("should fail");
    assert!(matches!(err, ConnectionError::Transport(_)));

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error { .. }));
    match next_event(&mut events).await {
        ConnectionEvent::ReconnectScheduled { attempt: 1, .. } => {}
        other => panic!("expected schedule, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    assert!(manager.peer().is_none());
    assert_eq!(manager.reconnection_status().expect("status missing").attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_traffic_keeps_session_alive_and_is_forwarded() {
    let (transport, manager) = setup(test_config(3));
    let mut inbound = manager.observe_inbound();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");

    // Frames every 5s keep silence under the 10s heartbeat timeout
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        transport.push_inbound(b"hb");
    }

    assert_eq!(manager.state(), ConnectionState::Connected);
    for _ in 0..6 {
        let payload = inbound.recv().await.expect("inbound closed");
        assert_eq!(&payload[..], b"hb");
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_during_episode_is_idempotent_for_same_peer() {
    let (transport, manager) = setup(ManagerConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        },
        ..ManagerConfig::default()
    });
    let mut events = manager.observe_events();

    manager.connect("peer-a", "did:key:a").await.expect("connect failed");
    transport.drop_link();

    loop {
        if let ConnectionEvent::ReconnectScheduled { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    manager.connect("peer-a", "did:key:a").await.expect("same-peer connect should no-op");
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    let err = manager.connect("peer-b", "did:key:b").await.expect_err("should refuse");
    assert!(matches!(err, ConnectionError::AlreadyConnected(_)));

    manager.cancel_reconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_state_stream_replays_current_value() {
    let (_transport, manager) = setup(test_config(3));
    manager.connect("peer-a", "did:key:a").await.expect("connect failed");

    // A late subscriber immediately sees the current state
    let late = manager.observe_state();
    assert_eq!(*late.borrow(), ConnectionState::Connected);

    let late_peer = manager.observe_peer();
    assert!(late_peer.borrow().is_some());
}
