//! peerlink: P2P connection lifecycle management with automatic reconnection
//!
//! This crate owns the client-side connection state machine for a single
//! logical session to a paired device: connect/disconnect, heartbeat-based
//! liveness detection, and bounded exponential-backoff reconnection with
//! jitter. The actual wire protocol lives behind the [`Transport`] trait;
//! UI layers consume the `watch`/`broadcast` streams exposed by
//! [`ConnectionManager`].

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod manager;
pub mod state;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use config::ManagerConfig;
pub use error::{ConnectionError, TransportError};
pub use event::ConnectionEvent;
pub use manager::ConnectionManager;
pub use state::{ConnectionState, PeerInfo, ReconnectionStatus};
pub use transport::{CredentialStore, Transport, TransportSession};
