//! WebSocket control endpoint: accept loop and per-session task management.
//!
//! Each control client holds one WebSocket connection and sends one JSON
//! [`PressAndReleaseRequest`](crate::domain::PressAndReleaseRequest) per text
//! frame.  Every text frame gets exactly one JSON reply, in order:
//!
//! ```text
//! client ─► {"type":"consumer","code":233}
//! client ◄─ {"status":"ok"}
//! client ─► {"code":0}
//! client ◄─ {"status":"error","error":"missing code"}
//! ```
//!
//! Each session runs in its own Tokio task, so a client blocked on a full
//! frame queue never stalls the accept loop.  Sessions share one
//! [`PressReleaseService`], whose pair lock keeps press/release pairs from
//! different clients apart.
//!
//! The accept loop and every session stop when the shutdown [`Signal`] is
//! raised.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{KeySender, PressReleaseService};
use crate::domain::ControlResponse;
use crate::infrastructure::device::Signal;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the control listener.
///
/// Kept separate from [`serve`] so a bad bind address is reported at startup,
/// before the device manager spawns anything.
///
/// # Errors
///
/// Returns an error if the address is in use or cannot be bound.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control listener on {addr}"))
}

/// Runs the accept loop until `shutdown` is raised.
///
/// # Errors
///
/// Currently always returns `Ok`; transient accept errors are logged and
/// the loop continues.
pub async fn serve<S>(
    listener: TcpListener,
    service: Arc<PressReleaseService<S>>,
    send_timeout: Duration,
    shutdown: Signal,
) -> anyhow::Result<()>
where
    S: KeySender + ?Sized + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("control endpoint listening on ws://{addr}");
    }

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                info!("shutdown signal received; stopping accept loop");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!("new control connection from {peer_addr}");
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    match run_session(stream, peer_addr, service, send_timeout, shutdown).await {
                        Ok(()) => debug!("session {peer_addr} closed"),
                        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
                    }
                });
            }
            Err(e) => {
                // Transient (e.g. too many open file descriptors).
                error!("accept error: {e}");
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn run_session<S>(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    service: Arc<PressReleaseService<S>>,
    send_timeout: Duration,
    shutdown: Signal,
) -> anyhow::Result<()>
where
    S: KeySender + ?Sized,
{
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
            next = ws_rx.next() => next,
        };

        let ws_msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => break,
            Some(Err(e)) => return Err(e).context("WebSocket read failed"),
        };

        let reply = match ws_msg {
            WsMessage::Text(text) => service.handle(&text, send_timeout).await,
            WsMessage::Binary(_) => ControlResponse::error("binary frames are not supported"),
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        let json = serde_json::to_string(&reply).context("failed to encode control response")?;
        ws_tx
            .send(WsMessage::Text(json))
            .await
            .context("WebSocket send failed")?;
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
