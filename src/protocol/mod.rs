//! Wire protocol shared by server and client.
//!
//! Every message in both directions is an [`Envelope`]:
//! `{"type": "<name>", "payload": <type-specific>}`.
//!
//! Commands (client → server) are named `<action>_<kind>` (`create_secret`,
//! `delete_building`) plus the kind-specific actions `building_command`,
//! `assign_skill`, `unassign_skill` and `sync`. Events (server → all
//! clients) are named `<kind>_<verb>` (`secret_created`, `agent_deleted`).

use crate::entity::{Agent, Building, BuildingCommand, CustomClass, EntityKind, Secret, Skill};
use crate::error::{ErrorKind, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod sanitize;

pub use sanitize::{sanitize_json, sanitize_utf16};

/// Server → originator: a command was rejected
pub const ERROR: &str = "error";
/// Server → one client: full state copy
pub const SNAPSHOT: &str = "snapshot";
/// Client → server: request a fresh snapshot
pub const SYNC: &str = "sync";
pub const BUILDING_COMMAND: &str = "building_command";
pub const ASSIGN_SKILL: &str = "assign_skill";
pub const UNASSIGN_SKILL: &str = "unassign_skill";

/// Message envelope, both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
        }
    }

    pub fn with_payload<T: Serialize>(
        msg_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(msg_type, serde_json::to_value(payload)?))
    }

    /// Authoritative `<kind>_<verb>` event.
    pub fn event<T: Serialize>(
        kind: EntityKind,
        verb: EventVerb,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Self::with_payload(event_type(kind, verb), payload)
    }

    pub fn error(err: &ServiceError) -> Self {
        let payload = ErrorPayload {
            kind: err.kind(),
            message: err.to_string(),
        };
        // ErrorPayload has no maps or non-string keys; serialization cannot fail
        Self::new(ERROR, serde_json::to_value(payload).unwrap_or(Value::Null))
    }

    pub fn snapshot(snapshot: &Snapshot) -> Result<Self, serde_json::Error> {
        Self::with_payload(SNAPSHOT, snapshot)
    }

    /// Parse an inbound text frame, replacing lone surrogate escapes first.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&sanitize_json(text))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Mutation verbs carried by event names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerb {
    Created,
    Updated,
    Deleted,
}

impl EventVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventVerb::Created => "created",
            EventVerb::Updated => "updated",
            EventVerb::Deleted => "deleted",
        }
    }

    fn command_prefix(&self) -> &'static str {
        match self {
            EventVerb::Created => "create",
            EventVerb::Updated => "update",
            EventVerb::Deleted => "delete",
        }
    }
}

const VERBS: [EventVerb; 3] = [EventVerb::Created, EventVerb::Updated, EventVerb::Deleted];

/// `secret_created`, `custom_class_deleted`, ...
pub fn event_type(kind: EntityKind, verb: EventVerb) -> String {
    format!("{}_{}", kind.as_str(), verb.as_str())
}

/// `create_secret`, `delete_custom_class`, ...
pub fn command_type(verb: EventVerb, kind: EntityKind) -> String {
    format!("{}_{}", verb.command_prefix(), kind.as_str())
}

/// Inverse of [`event_type`].
pub fn parse_event_type(msg_type: &str) -> Option<(EntityKind, EventVerb)> {
    VERBS.into_iter().find_map(|verb| {
        let kind = msg_type
            .strip_suffix(verb.as_str())?
            .strip_suffix('_')?
            .parse::<EntityKind>()
            .ok()?;
        Some((kind, verb))
    })
}

/// `{id}` payload for delete commands and deletion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPayload {
    pub id: String,
}

/// `{id, updates}` payload for update commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayload<P> {
    pub id: String,
    pub updates: P,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingCommandPayload {
    pub building_id: String,
    pub command: BuildingCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillAssignmentPayload {
    pub skill_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

/// Full copy of canonical state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub buildings: Vec<Building>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub custom_classes: Vec<CustomClass>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names() {
        assert_eq!(event_type(EntityKind::Secret, EventVerb::Created), "secret_created");
        assert_eq!(
            command_type(EventVerb::Deleted, EntityKind::CustomClass),
            "delete_custom_class"
        );
    }

    #[test]
    fn test_parse_event_type() {
        assert_eq!(
            parse_event_type("custom_class_updated"),
            Some((EntityKind::CustomClass, EventVerb::Updated))
        );
        assert_eq!(
            parse_event_type("secret_deleted"),
            Some((EntityKind::Secret, EventVerb::Deleted))
        );
        assert_eq!(parse_event_type("secretdeleted"), None);
        assert_eq!(parse_event_type("planet_created"), None);
        assert_eq!(parse_event_type(SNAPSHOT), None);
    }

    #[test]
    fn test_envelope_without_payload_defaults_to_null() {
        let envelope = Envelope::decode(r#"{"type": "sync"}"#).unwrap();
        assert_eq!(envelope.msg_type, SYNC);
        assert_eq!(envelope.payload, Value::Null);
    }

    #[test]
    fn test_envelope_missing_type_fails() {
        assert!(Envelope::decode(r#"{"payload": {}}"#).is_err());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = Envelope::error(&ServiceError::not_found(EntityKind::Secret, "sec_1"));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "type": "error",
                "payload": {"kind": "not_found", "message": "secret not found: sec_1"}
            })
        );
    }

    #[test]
    fn test_decode_sanitizes_lone_surrogates() {
        let envelope =
            Envelope::decode(r#"{"type": "create_secret", "payload": {"name": "bad\ud83d"}}"#)
                .unwrap();
        assert_eq!(envelope.payload["name"], "bad\u{FFFD}");
    }

    #[test]
    fn test_building_command_payload_wire_shape() {
        let payload: BuildingCommandPayload =
            serde_json::from_value(json!({"buildingId": "bld_1", "command": "healthCheck"}))
                .unwrap();
        assert_eq!(payload.command, BuildingCommand::HealthCheck);
    }
}
