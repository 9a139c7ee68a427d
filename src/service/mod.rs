// Entity services: sole owners and mutators of canonical state

mod agent;
mod building;
mod custom_class;
mod registry;
mod secret;
mod skill;

pub use agent::AgentService;
pub use building::{BuildingService, CommandOutput, CommandRunner, RunRequest, ShellRunner};
pub use custom_class::CustomClassService;
pub use registry::{ActionLease, Directory, Registry, UniqueIndex};
pub use secret::SecretService;
pub use skill::SkillService;

use crate::config::BuildingsConfig;
use crate::entity::{Agent, Building, CustomClass, EntityKind, Record, Secret, Skill};
use crate::error::ServiceError;
use crate::protocol::Snapshot;
use std::sync::Arc;
use std::time::Duration;


/// One service per entity kind, constructed once at startup and shared by
/// every connection.
#[derive(Clone)]
pub struct Services {
    pub buildings: Arc<BuildingService>,
    pub agents: Arc<AgentService>,
    pub skills: Arc<SkillService>,
    pub secrets: Arc<SecretService>,
    pub custom_classes: Arc<CustomClassService>,
}

impl Services {
    /// Services whose building commands run through the configured shell.
    pub fn new(config: &BuildingsConfig) -> Self {
        let runner = Arc::new(ShellRunner::new(
            config.shell.clone(),
            config.max_output_bytes,
        ));
        Self::with_runner(runner, Duration::from_secs(config.command_timeout_seconds))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, command_timeout: Duration) -> Self {
        let live_buildings = Arc::new(Directory::new(EntityKind::Building));
        let live_classes = Arc::new(Directory::new(EntityKind::CustomClass));
        let agents = Arc::new(AgentService::new(
            Arc::clone(&live_buildings),
            Arc::clone(&live_classes),
        ));

        Self {
            buildings: Arc::new(BuildingService::new(
                live_buildings,
                Arc::clone(&agents),
                runner,
                command_timeout,
            )),
            skills: Arc::new(SkillService::new(Arc::clone(&agents))),
            secrets: Arc::new(SecretService::new()),
            custom_classes: Arc::new(CustomClassService::new(live_classes, Arc::clone(&agents))),
            agents,
        }
    }

    /// Full copy of canonical state, used to seed and resync client mirrors.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            buildings: self.buildings.all(),
            agents: self.agents.all(),
            skills: self.skills.all(),
            secrets: self.secrets.all(),
            custom_classes: self.custom_classes.all(),
        }
    }
}

/// Create/update/delete surface shared by every entity service.
///
/// Command handlers are written against this trait, so they can be tested
/// with a stub service and no transport.
pub trait EntityService: Send + Sync + 'static {
    type Entity: Record;

    fn create(&self, draft: <Self::Entity as Record>::Draft) -> Result<Self::Entity, ServiceError>;

    fn update(
        &self,
        id: &str,
        patch: <Self::Entity as Record>::Patch,
    ) -> Result<Self::Entity, ServiceError>;

    /// Returns the removed entity.
    fn delete(&self, id: &str) -> Result<Self::Entity, ServiceError>;
}

macro_rules! entity_service {
    ($service:ty, $entity:ty) => {
        impl EntityService for $service {
            type Entity = $entity;

            fn create(&self, draft: <$entity as Record>::Draft) -> Result<$entity, ServiceError> {
                <$service>::create(self, draft)
            }

            fn update(
                &self,
                id: &str,
                patch: <$entity as Record>::Patch,
            ) -> Result<$entity, ServiceError> {
                <$service>::update(self, id, patch)
            }

            fn delete(&self, id: &str) -> Result<$entity, ServiceError> {
                <$service>::delete(self, id)
            }
        }
    };
}

entity_service!(BuildingService, Building);
entity_service!(AgentService, Agent);
entity_service!(SkillService, Skill);
entity_service!(SecretService, Secret);
entity_service!(CustomClassService, CustomClass);
