use super::{nullable, optional, required, EntityKind, Record};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Working,
    Waiting,
    Error,
    Offline,
}

impl AgentStatus {
    /// Active agents pin the building they are assigned to.
    pub fn is_active(&self) -> bool {
        !matches!(self, AgentStatus::Offline)
    }
}

/// Autonomous agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Builtin class name or custom class id
    pub class: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub building_id: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub cwd: Option<Option<String>>,
}

impl Record for Agent {
    const KIND: EntityKind = EntityKind::Agent;
    type Draft = AgentDraft;
    type Patch = AgentPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn from_draft(id: String, draft: AgentDraft, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        Ok(Agent {
            id,
            name: required("name", draft.name)?,
            class: required("class", draft.class)?,
            status: draft.status,
            building_id: optional(draft.building_id),
            cwd: optional(draft.cwd),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: AgentPatch) -> Result<(), ServiceError> {
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(class) = patch.class {
            self.class = required("class", class)?;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(building_id) = patch.building_id {
            self.building_id = optional(building_id);
        }
        if let Some(cwd) = patch.cwd {
            self.cwd = optional(cwd);
        }
        Ok(())
    }
}
