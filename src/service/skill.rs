use super::registry::{Registry, UniqueIndex};
use super::AgentService;
use crate::entity::{new_id, EntityKind, Record, Skill, SkillDraft, SkillPatch};
use crate::error::ServiceError;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct SkillService {
    registry: Registry<Skill>,
    slugs: UniqueIndex,
    agents: Arc<AgentService>,
}

impl SkillService {
    pub fn new(agents: Arc<AgentService>) -> Self {
        Self {
            registry: Registry::new(),
            slugs: UniqueIndex::new("slug"),
            agents,
        }
    }

    pub fn create(&self, draft: SkillDraft) -> Result<Skill, ServiceError> {
        let skill = Skill::from_draft(new_id(Skill::KIND), draft, Utc::now())?;
        self.slugs.reserve(&skill.slug, &skill.id)?;
        self.registry.insert(skill.clone());

        info!(skill_id = %skill.id, slug = %skill.slug, "Skill created");
        Ok(skill)
    }

    pub fn update(&self, id: &str, patch: SkillPatch) -> Result<Skill, ServiceError> {
        let skill = self.registry.modify(id, |skill| {
            let old_slug = skill.slug.clone();
            skill.apply_patch(patch)?;
            if skill.slug != old_slug {
                self.slugs.reserve(&skill.slug, &skill.id)?;
                self.slugs.release(&old_slug, &skill.id);
            }
            Ok(())
        })?;

        info!(skill_id = %skill.id, "Skill updated");
        Ok(skill)
    }

    pub fn delete(&self, id: &str) -> Result<Skill, ServiceError> {
        let removed = self.registry.remove(id, |_| Ok(()))?;
        self.slugs.release(&removed.slug, &removed.id);

        info!(skill_id = %id, "Skill deleted");
        Ok(removed)
    }

    /// Assign a skill to an existing agent.
    pub fn assign(&self, skill_id: &str, agent_id: &str) -> Result<Skill, ServiceError> {
        if self.agents.get(agent_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Agent, agent_id));
        }

        let skill = self.registry.modify(skill_id, |skill| {
            if skill.assigned_agent_ids.iter().any(|id| id == agent_id) {
                return Err(ServiceError::conflict(format!(
                    "skill '{}' is already assigned to agent {}",
                    skill.slug, agent_id
                )));
            }
            skill.assigned_agent_ids.push(agent_id.to_string());
            Ok(())
        })?;

        info!(skill_id = %skill_id, agent_id = %agent_id, "Skill assigned");
        Ok(skill)
    }

    pub fn unassign(&self, skill_id: &str, agent_id: &str) -> Result<Skill, ServiceError> {
        let skill = self.registry.modify(skill_id, |skill| {
            let Some(pos) = skill.assigned_agent_ids.iter().position(|id| id == agent_id) else {
                return Err(ServiceError::conflict(format!(
                    "skill '{}' is not assigned to agent {}",
                    skill.slug, agent_id
                )));
            };
            skill.assigned_agent_ids.remove(pos);
            Ok(())
        })?;

        info!(skill_id = %skill_id, agent_id = %agent_id, "Skill unassigned");
        Ok(skill)
    }

    pub fn get(&self, id: &str) -> Option<Skill> {
        self.registry.get(id)
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Skill> {
        let id = self.slugs.owner(slug)?;
        self.registry.get(&id)
    }

    pub fn all(&self) -> Vec<Skill> {
        self.registry.all()
    }
}
