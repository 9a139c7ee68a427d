//! Error taxonomy for command processing.
//!
//! Every rejected command maps to exactly one [`ServiceError`]. Errors are
//! reported to the originating connection only and are never broadcast.

use crate::entity::EntityKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Busy,
    Internal,
}

/// Outcome of a rejected command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed or missing command fields
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Business rule violation (duplicate key, illegal transition, refused delete)
    #[error("{0}")]
    Conflict(String),

    /// Entity is locked by an in-flight action; the caller may retry
    #[error("{kind} {id} is busy, retry later")]
    TransientBusy { kind: EntityKind, id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn busy(kind: EntityKind, id: impl Into<String>) -> Self {
        ServiceError::TransientBusy {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::TransientBusy { .. } => ErrorKind::Busy,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Validation(format!("invalid payload: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ServiceError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            ServiceError::not_found(EntityKind::Secret, "sec_1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ServiceError::conflict("dup").kind(), ErrorKind::Conflict);
        assert_eq!(
            ServiceError::busy(EntityKind::Building, "bld_1").kind(),
            ErrorKind::Busy
        );
        assert_eq!(
            ServiceError::Internal("boom".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ServiceError::not_found(EntityKind::CustomClass, "cls_9").to_string(),
            "custom_class not found: cls_9"
        );
        assert_eq!(
            ServiceError::busy(EntityKind::Building, "bld_1").to_string(),
            "building bld_1 is busy, retry later"
        );
    }
}
