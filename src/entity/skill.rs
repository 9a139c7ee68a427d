use super::{optional, required, EntityKind, Record};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reusable instruction bundle that can be assigned to agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    /// Unique lowercase handle (e.g. "git-review")
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub enabled: bool,
    #[serde(default)]
    pub assigned_agent_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDraft {
    #[serde(default)]
    pub name: String,
    /// Derived from `name` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for SkillDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: None,
            description: String::new(),
            content: String::new(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Lowercase a display name into a slug: runs of anything outside
/// `[a-z0-9]` collapse into a single dash.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Valid slugs: lowercase letters, digits and single dashes, no leading or
/// trailing dash.
pub(crate) fn is_valid_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return false;
    }
    slug.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validated_slug(slug: String) -> Result<String, ServiceError> {
    let slug = slug.trim().to_string();
    if !is_valid_slug(&slug) {
        return Err(ServiceError::validation(format!(
            "invalid slug '{}': must be lowercase letters, digits and dashes",
            slug
        )));
    }
    Ok(slug)
}

impl Record for Skill {
    const KIND: EntityKind = EntityKind::Skill;
    type Draft = SkillDraft;
    type Patch = SkillPatch;

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

    fn from_draft(id: String, draft: SkillDraft, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        let name = required("name", draft.name)?;
        let slug = match optional(draft.slug) {
            Some(slug) => validated_slug(slug)?,
            None => validated_slug(slugify(&name))?,
        };

        Ok(Skill {
            id,
            name,
            slug,
            description: draft.description.trim().to_string(),
            content: draft.content,
            enabled: draft.enabled,
            assigned_agent_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: SkillPatch) -> Result<(), ServiceError> {
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(slug) = patch.slug {
            self.slug = validated_slug(slug)?;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        Ok(())
    }
}
