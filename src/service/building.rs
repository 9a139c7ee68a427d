use super::registry::{Directory, Registry};
use super::AgentService;
use crate::entity::{Building, BuildingCommand, BuildingDraft, BuildingPatch};
use crate::error::ServiceError;
use anyhow::Context;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Script invocation for one building command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub script: String,
    pub cwd: Option<String>,
}

/// Result of a finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
}

/// External effect behind building commands.
///
/// `Err` means the script could not be run at all; a script that ran and
/// failed is `Ok` with `success: false`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: RunRequest) -> BoxFuture<'static, anyhow::Result<CommandOutput>>;
}

/// Runs building scripts through a shell (`sh -c <script>`).
pub struct ShellRunner {
    shell: String,
    max_output_bytes: usize,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, max_output_bytes: usize) -> Self {
        Self {
            shell: shell.into(),
            max_output_bytes,
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, request: RunRequest) -> BoxFuture<'static, anyhow::Result<CommandOutput>> {
        let shell = self.shell.clone();
        let max_output_bytes = self.max_output_bytes;

        async move {
            let mut command = tokio::process::Command::new(&shell);
            command.arg("-c").arg(&request.script).kill_on_drop(true);
            if let Some(cwd) = &request.cwd {
                command.current_dir(cwd);
            }

            let output = command
                .output()
                .await
                .with_context(|| format!("Failed to spawn '{}'", shell))?;

            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));

            Ok(CommandOutput {
                success: output.status.success(),
                output: keep_tail(text, max_output_bytes),
            })
        }
        .boxed()
    }
}

/// Keep the last `max_bytes` of `text`, cut on a char boundary.
fn keep_tail(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

pub struct BuildingService {
    registry: Registry<Building>,
    directory: Arc<Directory>,
    agents: Arc<AgentService>,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
}

impl BuildingService {
    /// `directory` is the live-building set shared with `agents`.
    pub fn new(
        directory: Arc<Directory>,
        agents: Arc<AgentService>,
        runner: Arc<dyn CommandRunner>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            registry: Registry::new(),
            directory,
            agents,
            runner,
            command_timeout,
        }
    }

    pub fn create(&self, draft: BuildingDraft) -> Result<Building, ServiceError> {
        let building = self.registry.create(draft)?;
        self.directory.register(&building.id);
        info!(building_id = %building.id, name = %building.name, "Building created");
        Ok(building)
    }

    pub fn update(&self, id: &str, patch: BuildingPatch) -> Result<Building, ServiceError> {
        let building = self.registry.update(id, patch)?;
        info!(building_id = %building.id, "Building updated");
        Ok(building)
    }

    /// Delete a building that has no active agents assigned.
    ///
    /// No agent can move into or activate in the building between the
    /// check and the removal.
    pub fn delete(&self, id: &str) -> Result<Building, ServiceError> {
        let removed = self.directory.retire(id, || {
            self.registry.remove(id, |building| {
                match self.agents.active_in_building(&building.id) {
                    0 => Ok(()),
                    n => Err(ServiceError::conflict(format!(
                        "building '{}' has {} active agent(s) assigned",
                        building.name, n
                    ))),
                }
            })
        })?;

        info!(building_id = %id, "Building deleted");
        Ok(removed)
    }

    /// Run a command against a building and settle its status.
    ///
    /// The building is leased for the whole run: any other command against
    /// it fails with `TransientBusy` until this one finishes.
    pub async fn execute(
        &self,
        id: &str,
        command: BuildingCommand,
    ) -> Result<Building, ServiceError> {
        let mut lease = self.registry.begin_action(id)?;
        let building = lease.entity().clone();
        let initial_status = building.status;

        if !command.allowed_from(building.status) {
            return Err(ServiceError::conflict(format!(
                "cannot {} building '{}' while it is {:?}",
                command.as_str(),
                building.name,
                building.status
            )));
        }

        let script = building.commands.script(command).ok_or_else(|| {
            ServiceError::validation(format!(
                "building '{}' has no {} command configured",
                building.name,
                command.as_str()
            ))
        })?;

        info!(building_id = %id, command = command.as_str(), "Executing building command");

        if let Some(status) = command.in_progress() {
            lease.stage(|building| building.status = status)?;
        }

        let request = RunRequest {
            script: script.to_string(),
            cwd: building.cwd.clone(),
        };

        let outcome = match tokio::time::timeout(self.command_timeout, self.runner.run(request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(building_id = %id, error = %e, "Building command failed to run");
                lease.restore(building);
                return Err(ServiceError::Internal(format!(
                    "failed to run {} command",
                    command.as_str()
                )));
            }
            Err(_) => {
                warn!(
                    building_id = %id,
                    timeout_secs = self.command_timeout.as_secs(),
                    "Building command timed out"
                );
                CommandOutput {
                    success: false,
                    output: format!("timed out after {}s", self.command_timeout.as_secs()),
                }
            }
        };

        let building = lease.complete(|building| {
            building.status = command.settle(initial_status, outcome.success);
            building.last_command_output = Some(outcome.output);
            building.last_command_at = Some(Utc::now());
            Ok(())
        })?;

        info!(
            building_id = %id,
            command = command.as_str(),
            status = ?building.status,
            "Building command finished"
        );
        Ok(building)
    }

    pub fn get(&self, id: &str) -> Option<Building> {
        self.registry.get(id)
    }

    pub fn all(&self) -> Vec<Building> {
        self.registry.all()
    }
}
