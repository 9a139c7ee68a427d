use crate::dispatch::HandlerContext;
use crate::protocol::Envelope;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// Fan-out point for authoritative events.
///
/// Every connection subscribes to one shared broadcast channel; replies and
/// errors travel on a per-connection channel instead.
pub struct Hub {
    events_tx: broadcast::Sender<Envelope>,
    next_connection_id: AtomicU64,
    connections: AtomicUsize,
}

/// Channels for one registered connection.
pub struct Connection {
    pub id: u64,
    pub context: HandlerContext,
    /// Messages addressed to this connection only
    pub replies: mpsc::UnboundedReceiver<Envelope>,
    /// Events addressed to every connection
    pub events: broadcast::Receiver<Envelope>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        Self {
            events_tx,
            next_connection_id: AtomicU64::new(1),
            connections: AtomicUsize::new(0),
        }
    }

    /// Register a connection. Events broadcast from here on reach it.
    pub fn connect(&self) -> Connection {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let events = self.events_tx.subscribe();
        let active = self.connections.fetch_add(1, Ordering::Relaxed) + 1;

        info!(connection_id = id, active, "Connection registered");

        Connection {
            id,
            context: HandlerContext::new(id, self.events_tx.clone(), reply_tx),
            replies,
            events,
        }
    }

    pub fn disconnect(&self, connection_id: u64) {
        let active = self.connections.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        info!(connection_id, active, "Connection closed");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Number of live event receivers.
    pub fn receiver_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_connections_get_distinct_ids() {
        let hub = Hub::new(8);
        let a = hub.connect();
        let b = hub.connect();

        assert_ne!(a.id, b.id);
        assert_eq!(a.context.connection_id(), a.id);
        assert_eq!(hub.connection_count(), 2);

        hub.disconnect(a.id);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_connection_reply_only_origin() {
        let hub = Hub::new(8);
        let mut a = hub.connect();
        let mut b = hub.connect();

        a.context.broadcast(Envelope::new("agent_created", Value::Null));
        a.context.reply(Envelope::new("snapshot", Value::Null));

        assert_eq!(a.events.try_recv().unwrap().msg_type, "agent_created");
        assert_eq!(b.events.try_recv().unwrap().msg_type, "agent_created");
        assert_eq!(a.replies.try_recv().unwrap().msg_type, "snapshot");
        assert!(b.replies.try_recv().is_err());
    }

    #[test]
    fn test_dropped_connection_stops_receiving() {
        let hub = Hub::new(8);
        let a = hub.connect();
        let b = hub.connect();
        assert_eq!(hub.receiver_count(), 2);

        drop(b);
        assert_eq!(hub.receiver_count(), 1);
        a.context.broadcast(Envelope::new("agent_created", Value::Null));
    }
}
