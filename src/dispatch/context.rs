use crate::error::ServiceError;
use crate::protocol::Envelope;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Per-connection handle given to every command handler.
///
/// A handler reports its outcome through exactly one of these: an
/// authoritative event to every connection via [`broadcast`](Self::broadcast),
/// or an error to the originating connection only via
/// [`send_error`](Self::send_error).
#[derive(Clone)]
pub struct HandlerContext {
    connection_id: u64,
    events_tx: broadcast::Sender<Envelope>,
    reply_tx: mpsc::UnboundedSender<Envelope>,
}

impl HandlerContext {
    pub fn new(
        connection_id: u64,
        events_tx: broadcast::Sender<Envelope>,
        reply_tx: mpsc::UnboundedSender<Envelope>,
    ) -> Self {
        Self {
            connection_id,
            events_tx,
            reply_tx,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Deliver an event to every connected client, including this one.
    pub fn broadcast(&self, event: Envelope) {
        debug!(
            connection_id = self.connection_id,
            msg_type = %event.msg_type,
            "Broadcasting event"
        );
        // Err only means nobody is connected
        let _ = self.events_tx.send(event);
    }

    /// Report a rejected command to the originating connection only.
    pub fn send_error(&self, err: &ServiceError) {
        warn!(
            connection_id = self.connection_id,
            kind = ?err.kind(),
            error = %err,
            "Command rejected"
        );
        self.reply(Envelope::error(err));
    }

    /// Send a message to the originating connection only.
    pub fn reply(&self, message: Envelope) {
        if self.reply_tx.send(message).is_err() {
            debug!(connection_id = self.connection_id, "Reply dropped, connection closed");
        }
    }
}
