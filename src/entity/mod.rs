use crate::error::ServiceError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod agent;
mod building;
mod custom_class;
mod secret;
mod skill;

#[cfg(test)]
mod tests;

pub use agent::{Agent, AgentDraft, AgentPatch, AgentStatus};
pub use building::{
    Building, BuildingCommand, BuildingCommands, BuildingDraft, BuildingPatch, BuildingStatus,
    BuildingType,
};
pub use custom_class::{CustomClass, CustomClassDraft, CustomClassPatch};
pub use secret::{Secret, SecretDraft, SecretPatch};
pub use skill::{slugify, Skill, SkillDraft, SkillPatch};

/// The kinds of shared entity the server owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Building,
    Agent,
    Skill,
    Secret,
    CustomClass,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Building,
        EntityKind::Agent,
        EntityKind::Skill,
        EntityKind::Secret,
        EntityKind::CustomClass,
    ];

    /// Wire name, used as the prefix of command and event types
    /// (e.g. `create_secret`, `secret_created`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Building => "building",
            EntityKind::Agent => "agent",
            EntityKind::Skill => "skill",
            EntityKind::Secret => "secret",
            EntityKind::CustomClass => "custom_class",
        }
    }

    /// Whether `id` was minted for this kind.
    pub fn owns_id(&self, id: &str) -> bool {
        id.strip_prefix(self.id_prefix())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Building => "bld",
            EntityKind::Agent => "agt",
            EntityKind::Skill => "skl",
            EntityKind::Secret => "sec",
            EntityKind::CustomClass => "cls",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

/// Generate a fresh entity id: `{prefix}_{uuid-v7}`.
///
/// UUIDv7 is time-ordered, so ids sort in creation order and a retired id
/// is never handed out again.
pub fn new_id(kind: EntityKind) -> String {
    format!("{}_{}", kind.id_prefix(), Uuid::now_v7().simple())
}

/// Binds an entity struct to the generic canonical store and client mirror.
pub trait Record:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;

    /// Creation payload (carries no id)
    type Draft: Serialize + DeserializeOwned + Send;

    /// Partial update payload
    type Patch: Serialize + DeserializeOwned + Send;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Validate a draft and build the entity with `createdAt == updatedAt == now`.
    fn from_draft(id: String, draft: Self::Draft, now: DateTime<Utc>)
        -> Result<Self, ServiceError>;

    /// Merge a patch into the entity, re-validating changed fields.
    ///
    /// Callers apply patches to a copy, so a failed patch leaves no trace.
    fn apply_patch(&mut self, patch: Self::Patch) -> Result<(), ServiceError>;

    /// Advance `updatedAt` strictly past its previous value.
    ///
    /// Every committed version of an id carries a distinct timestamp, so
    /// mirrors can order versions by `updatedAt` alone.
    fn touch(&mut self, now: DateTime<Utc>) {
        let previous = self.updated_at();
        let at = if now > previous {
            now
        } else {
            previous + TimeDelta::microseconds(1)
        };
        self.set_updated_at(at);
    }
}

/// Trim a required text field, rejecting empty values.
pub(crate) fn required(field: &str, value: String) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes `None`.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deserializer for patch fields that distinguish "absent" from "null".
///
/// `{}` leaves the field untouched (`None`), `{"cwd": null}` clears it
/// (`Some(None)`).
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
