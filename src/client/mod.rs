//! Client-side mirror of server state.
//!
//! [`ClientStore`] holds one immutable-snapshot [`Store`] per entity kind,
//! reconciled only from server messages. Intents send commands and never
//! touch the mirror. [`Notifier`] tells subscribers which kind changed.

pub mod connection;
mod error;
mod notify;
mod store;

#[cfg(test)]
mod tests;

pub use connection::{spawn_client, ClientEvent, ReconnectConfig};
pub use error::{ReconcileError, SendError};
pub use notify::{Notifier, SubscriptionId};
pub use store::{ClientStore, CommandSink, Store};
