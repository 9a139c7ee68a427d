use crate::dispatch::Dispatcher;
use crate::protocol::Envelope;
use crate::service::Services;
use crate::subscription::hub::Connection;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Drives one WebSocket connection.
///
/// The reader dispatches inbound commands one at a time; a separate writer
/// task owns the socket's send half and drains replies and broadcast events.
pub struct ConnectionManager {
    services: Services,
    dispatcher: Arc<Dispatcher>,
}

impl ConnectionManager {
    pub fn new(services: Services, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            services,
            dispatcher,
        }
    }

    /// Handle the connection until the client goes away.
    pub async fn handle(self, socket: WebSocket, connection: Connection) {
        let Connection {
            id,
            context,
            replies,
            events,
        } = connection;
        info!(connection_id = id, "WebSocket connection established");

        let (sink, mut stream) = socket.split();
        let writer = tokio::spawn(write_loop(
            sink,
            replies,
            events,
            self.services.clone(),
            id,
        ));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    self.dispatcher.dispatch_text(&context, &text).await;
                }
                Ok(Message::Close(_)) => {
                    info!(connection_id = id, "WebSocket client disconnected");
                    break;
                }
                Ok(_) => {
                    // Binary frames are not part of the protocol; ping/pong is
                    // answered by the socket itself
                }
                Err(e) => {
                    warn!(connection_id = id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        writer.abort();
        info!(connection_id = id, "WebSocket connection closed");
    }
}

/// Send the initial snapshot, then forward replies and events in order.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut replies: mpsc::UnboundedReceiver<Envelope>,
    mut events: broadcast::Receiver<Envelope>,
    services: Services,
    connection_id: u64,
) {
    if let Some(snapshot) = snapshot_envelope(&services) {
        if let Err(e) = send(&mut sink, &snapshot).await {
            debug!(connection_id, error = %e, "Failed to send initial snapshot");
            return;
        }
    }

    loop {
        let outbound = tokio::select! {
            Some(reply) = replies.recv() => reply,
            result = events.recv() => match result {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(connection_id, skipped, "Connection lagged, resending snapshot");
                    match snapshot_envelope(&services) {
                        Some(snapshot) => snapshot,
                        None => continue,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!(connection_id, "Event broadcast channel closed");
                    break;
                }
            },
            else => break,
        };

        if let Err(e) = send(&mut sink, &outbound).await {
            debug!(connection_id, error = %e, "WebSocket send failed, client disconnected");
            break;
        }
    }
}

fn snapshot_envelope(services: &Services) -> Option<Envelope> {
    match Envelope::snapshot(&services.snapshot()) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            error!(error = %e, "Failed to serialize snapshot");
            None
        }
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, envelope: &Envelope) -> anyhow::Result<()> {
    let text = envelope.encode()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
