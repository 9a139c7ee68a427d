use super::{nullable, optional, required, EntityKind, Record};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-defined agent class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Skills given to agents spawned with this class
    #[serde(default)]
    pub default_skill_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomClassDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub default_skill_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomClassPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub icon: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_skill_ids: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub instructions: Option<Option<String>>,
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

impl Record for CustomClass {
    const KIND: EntityKind = EntityKind::CustomClass;
    type Draft = CustomClassDraft;
    type Patch = CustomClassPatch;

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

    fn from_draft(
        id: String,
        draft: CustomClassDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        Ok(CustomClass {
            id,
            name: required("name", draft.name)?,
            description: draft.description.trim().to_string(),
            icon: optional(draft.icon),
            default_skill_ids: dedup_ids(draft.default_skill_ids),
            instructions: optional(draft.instructions),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: CustomClassPatch) -> Result<(), ServiceError> {
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(icon) = patch.icon {
            self.icon = optional(icon);
        }
        if let Some(ids) = patch.default_skill_ids {
            self.default_skill_ids = dedup_ids(ids);
        }
        if let Some(instructions) = patch.instructions {
            self.instructions = optional(instructions);
        }
        Ok(())
    }
}
