//! Reference TCP transport with length-prefixed framing
//!
//! Every payload is framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: payload ]
//! ```
//!
//! On open, the client identifies itself with a single hello frame carrying
//! the local peer id, the credential, and the signing key fetched from the
//! configured [`CredentialStore`] (empty when none is configured). Real
//! deployments put an encrypted handshake behind this trait instead; this
//! transport exists for the demo binary and loopback testing.

use crate::error::TransportError;
use crate::transport::{CredentialStore, OpenedSession, Transport, TransportSession};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Maximum frame size (1 MiB) to prevent memory exhaustion.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

const INBOUND_BUFFER: usize = 32;

/// Connects to a peer over plain TCP.
pub struct TcpTransport {
    address: String,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl TcpTransport {
    /// Create a transport that dials the given address on every open.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
        }
    }

    /// Like [`new`](Self::new), but signs the hello frame with key material
    /// from the given store on every open.
    pub fn with_credentials(address: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            address: address.into(),
            credentials: Some(store),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(
        &self,
        peer_id: &str,
        credential: &str,
    ) -> Result<OpenedSession, TransportError> {
        let signing_key = match &self.credentials {
            Some(store) => store.signing_key().await?,
            None => Bytes::new(),
        };

        let stream = TcpStream::connect(&self.address).await?;
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));

        // Identify ourselves before any application traffic
        let mut hello = BytesMut::from(format!("{peer_id}\n{credential}\n").as_bytes());
        hello.put_slice(&signing_key);
        write_frame(&mut *writer.lock().await, &hello).await?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let reader_task = tokio::spawn(pump_inbound(reader, inbound_tx));

        let session = TcpSession {
            writer,
            reader_task,
        };
        Ok((Box::new(session), inbound_rx))
    }
}

/// One TCP link to the peer.
struct TcpSession {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl TransportSession for TcpSession {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_SIZE as usize {
            // The link itself is fine, only this payload is refused
            return Err(TransportError::transient(format!(
                "payload too large: {} bytes (max {MAX_FRAME_SIZE})",
                payload.len()
            )));
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut writer, &payload).await
    }

    async fn close(&mut self) {
        self.reader_task.abort();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, payload: &[u8]) -> Result<(), TransportError> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read frames off the socket and push them to the session's inbound
/// channel. Dropping the sender (EOF, read error, oversized frame) is how
/// the manager learns the link closed.
async fn pump_inbound(mut reader: OwnedReadHalf, inbound_tx: mpsc::Sender<Bytes>) {
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            debug!("tcp link closed while reading frame length");
            return;
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_SIZE {
            debug!(len, "dropping tcp link: frame exceeds maximum size");
            return;
        }

        let mut payload = vec![0u8; len as usize];
        if reader.read_exact(&mut payload).await.is_err() {
            debug!("tcp link closed mid-frame");
            return;
        }

        if inbound_tx.send(Bytes::from(payload)).await.is_err() {
            // Receiver side was dropped; session is being torn down
            return;
        }
    }
}
