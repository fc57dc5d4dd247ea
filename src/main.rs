//! Demo binary: maintain a session to a peer over the reference TCP
//! transport and log lifecycle events.
//!
//! Usage: `peerlink-demo <address> <peer-id> [credential]`

use anyhow::{Context, Result};
use bytes::Bytes;
use peerlink::transport::TcpTransport;
use peerlink::{ConnectionManager, ManagerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut args = std::env::args().skip(1);
    let address = args.next().context("usage: peerlink-demo <address> <peer-id> [credential]")?;
    let peer_id = args.next().context("missing peer id")?;
    let credential = args.next().unwrap_or_else(|| "did:key:demo".into());

    info!(%address, %peer_id, "peerlink demo starting");

    let transport = Arc::new(TcpTransport::new(address));
    let manager = ConnectionManager::new(transport, ManagerConfig::default());

    let mut events = manager.observe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "connection event");
        }
    });

    let mut inbound = manager.observe_inbound();
    tokio::spawn(async move {
        while let Ok(payload) = inbound.recv().await {
            info!(len = payload.len(), "inbound payload");
        }
    });

    manager.connect(peer_id.as_str(), credential.as_str()).await?;

    // Ping the peer every few seconds until interrupted
    let mut ticker = tokio::time::interval(Duration::from_secs(3));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = manager.send(Bytes::from_static(b"ping")).await {
                    warn!(error = %e, "send failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                manager.disconnect().await;
                return Ok(());
            }
        }
    }
}
