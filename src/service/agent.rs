use super::registry::{Directory, Registry};
use crate::entity::{new_id, Agent, AgentDraft, AgentPatch, EntityKind, Record};
use crate::error::ServiceError;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

type LiveCheck<'a> = &'a dyn Fn(&str) -> Result<(), ServiceError>;

pub struct AgentService {
    registry: Registry<Agent>,
    buildings: Arc<Directory>,
    classes: Arc<Directory>,
}

impl AgentService {
    /// `buildings` and `classes` are shared with the services that own
    /// those kinds.
    pub fn new(buildings: Arc<Directory>, classes: Arc<Directory>) -> Self {
        Self {
            registry: Registry::new(),
            buildings,
            classes,
        }
    }

    pub fn create(&self, draft: AgentDraft) -> Result<Agent, ServiceError> {
        let agent = self.with_references(|building_live, class_live| {
            let agent = Agent::from_draft(new_id(EntityKind::Agent), draft, Utc::now())?;
            check_references(&agent, None, building_live, class_live)?;
            self.registry.insert(agent.clone());
            Ok(agent)
        })?;
        info!(agent_id = %agent.id, class = %agent.class, "Agent created");
        Ok(agent)
    }

    pub fn update(&self, id: &str, patch: AgentPatch) -> Result<Agent, ServiceError> {
        let agent = self.with_references(|building_live, class_live| {
            self.registry.modify(id, |agent| {
                let previous = agent.clone();
                agent.apply_patch(patch)?;
                check_references(agent, Some(&previous), building_live, class_live)
            })
        })?;
        info!(agent_id = %agent.id, status = ?agent.status, "Agent updated");
        Ok(agent)
    }

    pub fn delete(&self, id: &str) -> Result<Agent, ServiceError> {
        let removed = self.registry.remove(id, |_| Ok(()))?;
        info!(agent_id = %id, "Agent deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<Agent> {
        self.registry.get(id)
    }

    pub fn all(&self) -> Vec<Agent> {
        self.registry.all()
    }

    /// Number of non-offline agents assigned to a building.
    pub fn active_in_building(&self, building_id: &str) -> usize {
        self.registry.count(|agent| {
            agent.status.is_active() && agent.building_id.as_deref() == Some(building_id)
        })
    }

    /// Number of agents of the given class.
    pub fn using_class(&self, class: &str) -> usize {
        self.registry.count(|agent| agent.class == class)
    }

    /// Pin live buildings, then live classes, around an agent write.
    fn with_references<R, F>(&self, write: F) -> Result<R, ServiceError>
    where
        F: FnOnce(LiveCheck<'_>, LiveCheck<'_>) -> Result<R, ServiceError>,
    {
        self.buildings.pinned(|building_live| {
            self.classes
                .pinned(|class_live| write(building_live, class_live))
        })
    }
}

/// Reject references to buildings or custom classes that do not exist.
///
/// Only references the write introduces are checked: an agent parked
/// offline in a since-deleted building can still be renamed.
fn check_references(
    agent: &Agent,
    previous: Option<&Agent>,
    building_live: LiveCheck<'_>,
    class_live: LiveCheck<'_>,
) -> Result<(), ServiceError> {
    if let Some(building_id) = agent.building_id.as_deref() {
        let moved = previous.map_or(true, |p| p.building_id.as_deref() != Some(building_id));
        let activated =
            agent.status.is_active() && previous.map_or(true, |p| !p.status.is_active());
        if moved || activated {
            building_live(building_id)?;
        }
    }

    let reclassed = previous.map_or(true, |p| p.class != agent.class);
    if reclassed && EntityKind::CustomClass.owns_id(&agent.class) {
        class_live(&agent.class)?;
    }
    Ok(())
}
