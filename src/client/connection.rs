//! WebSocket client that keeps a [`ClientStore`] in sync with a server.
//!
//! Server messages are applied to the store; intents queued on the store's
//! command channel are forwarded to the server. The session reconnects with
//! jittered exponential backoff, and the server's connect-time snapshot
//! resynchronises the mirror after every reconnect. Commands issued while
//! disconnected are held and sent once the next session is up.

use super::error::ReconcileError;
use super::store::ClientStore;
use crate::protocol::{Envelope, ErrorPayload};
use anyhow::Context;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Backoff between reconnect attempts
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

/// Connection status and errors, kept out of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: String },
    /// The server rejected a command
    Rejected(ErrorPayload),
    /// Transport or decoding problem
    Error(String),
}

/// How a session ended
enum SessionEnd {
    /// Server went away; reconnect
    Closed,
    /// The store's command channel closed; stop for good
    Shutdown,
}

/// Run a client until the store's command sender is dropped.
pub fn spawn_client(
    url: impl Into<String>,
    reconnect: ReconnectConfig,
    store: Arc<ClientStore>,
    mut commands: mpsc::UnboundedReceiver<Envelope>,
    status: mpsc::UnboundedSender<ClientEvent>,
) -> JoinHandle<()> {
    let url = url.into();

    tokio::spawn(async move {
        let mut backoff = reconnect.initial_ms;
        loop {
            match run_session(&url, &store, &mut commands, &status).await {
                Ok(SessionEnd::Shutdown) => {
                    info!(url = %url, "Client shut down");
                    return;
                }
                Ok(SessionEnd::Closed) => {
                    backoff = reconnect.initial_ms;
                    let _ = status.send(ClientEvent::Disconnected {
                        reason: "connection closed".to_string(),
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Client session failed");
                    let _ = status.send(ClientEvent::Error(format!("{:#}", e)));
                }
            }

            let delay = jittered_backoff(backoff, reconnect.jitter_ms);
            debug!(delay_ms = delay, "Reconnecting");
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let next = (backoff as f64 * reconnect.multiplier) as u64;
            backoff = next.min(reconnect.max_ms);
        }
    })
}

async fn run_session(
    url: &str,
    store: &ClientStore,
    commands: &mut mpsc::UnboundedReceiver<Envelope>,
    status: &mpsc::UnboundedSender<ClientEvent>,
) -> anyhow::Result<SessionEnd> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    info!(url = %url, "Client connected");
    let _ = status.send(ClientEvent::Connected);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => apply_frame(store, &text, status),
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("WebSocket read failed"),
            },
            command = commands.recv() => match command {
                Some(command) => {
                    let text = command.encode().context("Failed to encode command")?;
                    sink.send(Message::Text(text))
                        .await
                        .context("WebSocket send failed")?;
                }
                None => {
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            },
        }
    }
}

fn apply_frame(store: &ClientStore, text: &str, status: &mpsc::UnboundedSender<ClientEvent>) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Undecodable server message");
            let _ = status.send(ClientEvent::Error(format!("undecodable server message: {}", e)));
            return;
        }
    };

    match store.apply(&envelope) {
        Ok(()) => {}
        Err(ReconcileError::Rejected(error)) => {
            debug!(kind = ?error.kind, message = %error.message, "Command rejected by server");
            let _ = status.send(ClientEvent::Rejected(error));
        }
        Err(e) => {
            warn!(error = %e, "Failed to apply server message");
            let _ = status.send(ClientEvent::Error(e.to_string()));
        }
    }
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    base_ms.saturating_add(rand::thread_rng().gen_range(0..jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        assert_eq!(jittered_backoff(500, 0), 500);
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        for _ in 0..100 {
            let delay = jittered_backoff(500, 250);
            assert!((500..750).contains(&delay));
        }
    }
}
