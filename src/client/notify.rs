use crate::entity::EntityKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(EntityKind) + Send + Sync>;

/// Change notifications for client stores.
///
/// Callbacks run synchronously on the thread that applied the change and
/// receive only the kind that changed; they read the new state from the
/// store. One notification per applied change, no batching.
pub struct Notifier {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Callback)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(EntityKind) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn notify(&self, kind: EntityKind) {
        // Callbacks may subscribe or unsubscribe; call them outside the lock
        let subscribers: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(kind);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
