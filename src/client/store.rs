use super::error::{ReconcileError, SendError};
use super::notify::Notifier;
use crate::entity::{
    Agent, AgentDraft, AgentPatch, Building, BuildingCommand, BuildingDraft, BuildingPatch,
    CustomClass, CustomClassDraft, CustomClassPatch, EntityKind, Record, Secret, SecretDraft,
    SecretPatch, Skill, SkillDraft, SkillPatch,
};
use crate::protocol::{
    self, command_type, parse_event_type, BuildingCommandPayload, Envelope, ErrorPayload,
    EventVerb, IdPayload, SkillAssignmentPayload, Snapshot, UpdatePayload,
};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Client-side mirror of one entity kind.
///
/// Readers get an immutable snapshot; every change from the server builds a
/// new copy, swaps it in, then notifies once.
pub struct Store<T: Record> {
    state: RwLock<Mirror<T>>,
    notifier: Arc<Notifier>,
}

struct Mirror<T> {
    live: Arc<IndexMap<String, T>>,
    /// Ids the server has deleted. Ids are never reused, so any later
    /// event for one of these is a delayed echo of an older version.
    retired: HashSet<String>,
}

impl<T: Record> Store<T> {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            state: RwLock::new(Mirror {
                live: Arc::new(IndexMap::new()),
                retired: HashSet::new(),
            }),
            notifier,
        }
    }

    /// Replace the whole collection, keeping the server's order.
    pub fn set_from_server(&self, entities: Vec<T>) {
        self.replace(|map, retired| {
            *map = entities
                .into_iter()
                .filter(|entity| !retired.contains(entity.id()))
                .map(|entity| (entity.id().to_string(), entity))
                .collect();
        });
    }

    /// Insert a created entity. A deleted id is never re-added.
    pub fn add_from_server(&self, entity: T) {
        self.replace(|map, retired| {
            if retired.contains(entity.id()) {
                debug!(kind = %T::KIND, id = %entity.id(), "Ignoring create for deleted id");
                return;
            }
            map.insert(entity.id().to_string(), entity);
        });
    }

    /// Upsert. An update no newer than the mirrored copy, or for a deleted
    /// id, is ignored.
    pub fn update_from_server(&self, entity: T) {
        self.replace(|map, retired| {
            if retired.contains(entity.id()) {
                debug!(kind = %T::KIND, id = %entity.id(), "Ignoring update for deleted id");
                return;
            }
            if let Some(current) = map.get(entity.id()) {
                if current.updated_at() >= entity.updated_at() {
                    debug!(kind = %T::KIND, id = %entity.id(), "Ignoring stale update");
                    return;
                }
            }
            map.insert(entity.id().to_string(), entity);
        });
    }

    /// Removing an unknown id is a no-op (subscribers are still notified).
    pub fn remove_from_server(&self, id: &str) {
        self.replace(|map, retired| {
            map.shift_remove(id);
            retired.insert(id.to_string());
        });
    }

    /// Current collection; unaffected by later changes.
    pub fn snapshot(&self) -> Arc<IndexMap<String, T>> {
        let current = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current.live)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.snapshot().get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<T> {
        self.snapshot().values().cloned().collect()
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.snapshot().values().find(|e| predicate(e)).cloned()
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.snapshot()
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Route a `<kind>_<verb>` event payload.
    fn apply_event(&self, verb: EventVerb, payload: &Value) -> Result<(), serde_json::Error> {
        match verb {
            EventVerb::Created => self.add_from_server(decode(payload)?),
            EventVerb::Updated => self.update_from_server(decode(payload)?),
            EventVerb::Deleted => {
                let IdPayload { id } = decode(payload)?;
                self.remove_from_server(&id);
            }
        }
        Ok(())
    }

    /// Copy, change, swap, then notify outside the lock.
    fn replace(&self, change: impl FnOnce(&mut IndexMap<String, T>, &mut HashSet<String>)) {
        {
            let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mirror = &mut *current;
            let mut next = IndexMap::clone(&*mirror.live);
            change(&mut next, &mut mirror.retired);
            mirror.live = Arc::new(next);
        }
        self.notifier.notify(T::KIND);
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(payload)
}

/// Non-blocking outbound command channel.
#[derive(Clone)]
pub struct CommandSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl CommandSink {
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send<P: Serialize>(&self, msg_type: impl Into<String>, payload: &P) -> Result<(), SendError> {
        let envelope = Envelope::with_payload(msg_type, payload)?;
        self.tx.send(envelope).map_err(|_| SendError::Disconnected)
    }
}

/// Client-side mirror of every entity kind plus the intent surface.
///
/// Intents only send commands; the mirror changes when the server's
/// authoritative event comes back through [`ClientStore::apply`].
pub struct ClientStore {
    pub buildings: Store<Building>,
    pub agents: Store<Agent>,
    pub skills: Store<Skill>,
    pub secrets: Store<Secret>,
    pub custom_classes: Store<CustomClass>,
    notifier: Arc<Notifier>,
    commands: CommandSink,
}

impl ClientStore {
    pub fn new(notifier: Arc<Notifier>, commands: CommandSink) -> Self {
        Self {
            buildings: Store::new(Arc::clone(&notifier)),
            agents: Store::new(Arc::clone(&notifier)),
            skills: Store::new(Arc::clone(&notifier)),
            secrets: Store::new(Arc::clone(&notifier)),
            custom_classes: Store::new(Arc::clone(&notifier)),
            notifier,
            commands,
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Apply one server message to the mirror.
    ///
    /// An `error` message changes nothing and comes back as
    /// [`ReconcileError::Rejected`].
    pub fn apply(&self, envelope: &Envelope) -> Result<(), ReconcileError> {
        let invalid = |source| ReconcileError::InvalidPayload {
            msg_type: envelope.msg_type.clone(),
            source,
        };

        match envelope.msg_type.as_str() {
            protocol::SNAPSHOT => {
                let snapshot: Snapshot = decode(&envelope.payload).map_err(invalid)?;
                self.buildings.set_from_server(snapshot.buildings);
                self.agents.set_from_server(snapshot.agents);
                self.skills.set_from_server(snapshot.skills);
                self.secrets.set_from_server(snapshot.secrets);
                self.custom_classes.set_from_server(snapshot.custom_classes);
                Ok(())
            }
            protocol::ERROR => {
                let error: ErrorPayload = decode(&envelope.payload).map_err(invalid)?;
                Err(ReconcileError::Rejected(error))
            }
            msg_type => {
                let (kind, verb) = parse_event_type(msg_type)
                    .ok_or_else(|| ReconcileError::UnknownType(msg_type.to_string()))?;
                let payload = &envelope.payload;
                let applied = match kind {
                    EntityKind::Building => self.buildings.apply_event(verb, payload),
                    EntityKind::Agent => self.agents.apply_event(verb, payload),
                    EntityKind::Skill => self.skills.apply_event(verb, payload),
                    EntityKind::Secret => self.secrets.apply_event(verb, payload),
                    EntityKind::CustomClass => self.custom_classes.apply_event(verb, payload),
                };
                applied.map_err(invalid)
            }
        }
    }

    // Lookups

    pub fn get_secret_by_key(&self, key: &str) -> Option<Secret> {
        self.secrets.find(|secret| secret.key == key)
    }

    pub fn get_skill_by_slug(&self, slug: &str) -> Option<Skill> {
        self.skills.find(|skill| skill.slug == slug)
    }

    pub fn agents_in_building(&self, building_id: &str) -> Vec<Agent> {
        self.agents
            .filter(|agent| agent.building_id.as_deref() == Some(building_id))
    }

    // Intents

    pub fn create_building(&self, draft: BuildingDraft) -> Result<(), SendError> {
        self.create::<Building>(&draft)
    }

    pub fn update_building(&self, id: &str, patch: BuildingPatch) -> Result<(), SendError> {
        self.update::<Building>(id, patch)
    }

    pub fn delete_building(&self, id: &str) -> Result<(), SendError> {
        self.delete::<Building>(id)
    }

    pub fn execute_building_command(
        &self,
        building_id: &str,
        command: BuildingCommand,
    ) -> Result<(), SendError> {
        self.commands.send(
            protocol::BUILDING_COMMAND,
            &BuildingCommandPayload {
                building_id: building_id.to_string(),
                command,
            },
        )
    }

    pub fn create_agent(&self, draft: AgentDraft) -> Result<(), SendError> {
        self.create::<Agent>(&draft)
    }

    pub fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<(), SendError> {
        self.update::<Agent>(id, patch)
    }

    pub fn delete_agent(&self, id: &str) -> Result<(), SendError> {
        self.delete::<Agent>(id)
    }

    pub fn create_skill(&self, draft: SkillDraft) -> Result<(), SendError> {
        self.create::<Skill>(&draft)
    }

    pub fn update_skill(&self, id: &str, patch: SkillPatch) -> Result<(), SendError> {
        self.update::<Skill>(id, patch)
    }

    pub fn delete_skill(&self, id: &str) -> Result<(), SendError> {
        self.delete::<Skill>(id)
    }

    pub fn assign_skill(&self, skill_id: &str, agent_id: &str) -> Result<(), SendError> {
        self.commands
            .send(protocol::ASSIGN_SKILL, &assignment(skill_id, agent_id))
    }

    pub fn unassign_skill(&self, skill_id: &str, agent_id: &str) -> Result<(), SendError> {
        self.commands
            .send(protocol::UNASSIGN_SKILL, &assignment(skill_id, agent_id))
    }

    pub fn create_secret(&self, draft: SecretDraft) -> Result<(), SendError> {
        self.create::<Secret>(&draft)
    }

    pub fn update_secret(&self, id: &str, patch: SecretPatch) -> Result<(), SendError> {
        self.update::<Secret>(id, patch)
    }

    pub fn delete_secret(&self, id: &str) -> Result<(), SendError> {
        self.delete::<Secret>(id)
    }

    pub fn create_custom_class(&self, draft: CustomClassDraft) -> Result<(), SendError> {
        self.create::<CustomClass>(&draft)
    }

    pub fn update_custom_class(&self, id: &str, patch: CustomClassPatch) -> Result<(), SendError> {
        self.update::<CustomClass>(id, patch)
    }

    pub fn delete_custom_class(&self, id: &str) -> Result<(), SendError> {
        self.delete::<CustomClass>(id)
    }

    /// Ask the server for a fresh snapshot.
    pub fn sync(&self) -> Result<(), SendError> {
        self.commands.send(protocol::SYNC, &Value::Null)
    }

    fn create<T: Record>(&self, draft: &T::Draft) -> Result<(), SendError> {
        self.commands
            .send(command_type(EventVerb::Created, T::KIND), draft)
    }

    fn update<T: Record>(&self, id: &str, patch: T::Patch) -> Result<(), SendError> {
        self.commands.send(
            command_type(EventVerb::Updated, T::KIND),
            &UpdatePayload {
                id: id.to_string(),
                updates: patch,
            },
        )
    }

    fn delete<T: Record>(&self, id: &str) -> Result<(), SendError> {
        self.commands.send(
            command_type(EventVerb::Deleted, T::KIND),
            &IdPayload { id: id.to_string() },
        )
    }
}

fn assignment(skill_id: &str, agent_id: &str) -> SkillAssignmentPayload {
    SkillAssignmentPayload {
        skill_id: skill_id.to_string(),
        agent_id: agent_id.to_string(),
    }
}
