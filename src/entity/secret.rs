use super::{nullable, optional, required, EntityKind, Record};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access secret, referenced from agent prompts as `{{KEY}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: String,
    pub name: String,
    /// Placeholder key, unique among live secrets
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub description: Option<Option<String>>,
}

/// Valid keys: an uppercase letter followed by uppercase letters, digits or
/// underscores (e.g. `OPENAI_KEY`).
pub(crate) fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn validated_key(key: String) -> Result<String, ServiceError> {
    let key = required("key", key)?;
    if !is_valid_key(&key) {
        return Err(ServiceError::validation(format!(
            "invalid key '{}': must match [A-Z][A-Z0-9_]*",
            key
        )));
    }
    Ok(key)
}

impl Record for Secret {
    const KIND: EntityKind = EntityKind::Secret;
    type Draft = SecretDraft;
    type Patch = SecretPatch;

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

    fn from_draft(id: String, draft: SecretDraft, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        Ok(Secret {
            id,
            name: required("name", draft.name)?,
            key: validated_key(draft.key)?,
            value: draft.value,
            description: optional(draft.description),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: SecretPatch) -> Result<(), ServiceError> {
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(key) = patch.key {
            self.key = validated_key(key)?;
        }
        if let Some(value) = patch.value {
            self.value = value;
        }
        if let Some(description) = patch.description {
            self.description = optional(description);
        }
        Ok(())
    }
}
