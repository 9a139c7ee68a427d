use super::{nullable, optional, required, EntityKind, Record};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a building represents in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingType {
    #[default]
    Server,
    Database,
    Docker,
    Link,
    Folder,
    Boss,
}

/// Lifecycle status of the process a building manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
    #[default]
    Unknown,
}

/// Actions a client can execute against a building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildingCommand {
    Start,
    Stop,
    Restart,
    HealthCheck,
    Logs,
}

impl BuildingCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingCommand::Start => "start",
            BuildingCommand::Stop => "stop",
            BuildingCommand::Restart => "restart",
            BuildingCommand::HealthCheck => "healthCheck",
            BuildingCommand::Logs => "logs",
        }
    }

    /// Whether the command may run while the building is in `status`.
    pub fn allowed_from(&self, status: BuildingStatus) -> bool {
        use BuildingStatus::*;
        match self {
            BuildingCommand::Start => matches!(status, Stopped | Error | Unknown),
            BuildingCommand::Stop => matches!(status, Running | Starting | Error | Unknown),
            BuildingCommand::Restart => matches!(status, Running | Error | Unknown),
            BuildingCommand::HealthCheck => !matches!(status, Stopped | Stopping),
            BuildingCommand::Logs => true,
        }
    }

    /// Status shown while the command runs, if it has one.
    pub fn in_progress(&self) -> Option<BuildingStatus> {
        match self {
            BuildingCommand::Start | BuildingCommand::Restart => Some(BuildingStatus::Starting),
            BuildingCommand::Stop => Some(BuildingStatus::Stopping),
            BuildingCommand::HealthCheck | BuildingCommand::Logs => None,
        }
    }

    /// Status after the command finished with the given outcome.
    pub fn settle(&self, current: BuildingStatus, success: bool) -> BuildingStatus {
        match (self, success) {
            (BuildingCommand::Logs, _) => current,
            (BuildingCommand::Stop, true) => BuildingStatus::Stopped,
            (_, true) => BuildingStatus::Running,
            (_, false) => BuildingStatus::Error,
        }
    }
}

/// Shell scripts bound to each building command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingCommands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl BuildingCommands {
    /// Script configured for `command`, if any.
    pub fn script(&self, command: BuildingCommand) -> Option<&str> {
        let script = match command {
            BuildingCommand::Start => &self.start,
            BuildingCommand::Stop => &self.stop,
            BuildingCommand::Restart => &self.restart,
            BuildingCommand::HealthCheck => &self.health_check,
            BuildingCommand::Logs => &self.logs,
        };
        script.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Infrastructure building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: String,
    pub name: String,
    pub building_type: BuildingType,
    pub status: BuildingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub commands: BuildingCommands,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub building_type: BuildingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub commands: BuildingCommands,
}

/// Partial update. Status is not patchable; it only moves through commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<BuildingType>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable::deserialize"
    )]
    pub cwd: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<BuildingCommands>,
}

impl Record for Building {
    const KIND: EntityKind = EntityKind::Building;
    type Draft = BuildingDraft;
    type Patch = BuildingPatch;

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

    fn from_draft(id: String, draft: BuildingDraft, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        Ok(Building {
            id,
            name: required("name", draft.name)?,
            building_type: draft.building_type,
            status: BuildingStatus::default(),
            cwd: optional(draft.cwd),
            commands: draft.commands,
            last_command_output: None,
            last_command_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: BuildingPatch) -> Result<(), ServiceError> {
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(building_type) = patch.building_type {
            self.building_type = building_type;
        }
        if let Some(cwd) = patch.cwd {
            self.cwd = optional(cwd);
        }
        if let Some(commands) = patch.commands {
            self.commands = commands;
        }
        Ok(())
    }
}
