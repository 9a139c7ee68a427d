use crate::protocol::ErrorPayload;
use thiserror::Error;

/// A server message the client mirror could not apply.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unknown server message type '{0}'")]
    UnknownType(String),

    #[error("invalid {msg_type} payload: {source}")]
    InvalidPayload {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server rejected one of this client's commands
    #[error("command rejected ({:?}): {}", .0.kind, .0.message)]
    Rejected(ErrorPayload),
}

/// An intent that could not be handed to the connection.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("client connection is gone")]
    Disconnected,

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}
