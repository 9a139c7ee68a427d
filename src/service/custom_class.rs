use super::registry::{Directory, Registry};
use super::AgentService;
use crate::entity::{CustomClass, CustomClassDraft, CustomClassPatch};
use crate::error::ServiceError;
use std::sync::Arc;
use tracing::info;

pub struct CustomClassService {
    registry: Registry<CustomClass>,
    directory: Arc<Directory>,
    agents: Arc<AgentService>,
}

impl CustomClassService {
    pub fn new(directory: Arc<Directory>, agents: Arc<AgentService>) -> Self {
        Self {
            registry: Registry::new(),
            directory,
            agents,
        }
    }

    pub fn create(&self, draft: CustomClassDraft) -> Result<CustomClass, ServiceError> {
        let class = self.registry.create(draft)?;
        self.directory.register(&class.id);
        info!(class_id = %class.id, name = %class.name, "Custom class created");
        Ok(class)
    }

    pub fn update(&self, id: &str, patch: CustomClassPatch) -> Result<CustomClass, ServiceError> {
        let class = self.registry.update(id, patch)?;
        info!(class_id = %class.id, "Custom class updated");
        Ok(class)
    }

    /// Delete a class no agent is using.
    pub fn delete(&self, id: &str) -> Result<CustomClass, ServiceError> {
        let removed = self.directory.retire(id, || {
            self.registry.remove(id, |class| {
                match self.agents.using_class(&class.id) {
                    0 => Ok(()),
                    n => Err(ServiceError::conflict(format!(
                        "custom class '{}' is used by {} agent(s)",
                        class.name, n
                    ))),
                }
            })
        })?;

        info!(class_id = %id, "Custom class deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<CustomClass> {
        self.registry.get(id)
    }

    pub fn all(&self) -> Vec<CustomClass> {
        self.registry.all()
    }
}
