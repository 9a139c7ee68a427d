use crate::entity::{new_id, EntityKind, Record};
use crate::error::ServiceError;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Canonical entity plus its in-flight action marker.
struct Slot<T> {
    entity: T,
    /// Set while an async action owns the entity
    busy: bool,
}

/// Canonical collection for one entity kind.
///
/// Every mutation of a given id runs under that id's shard write lock, so
/// mutations against one id are applied one at a time and the last applied
/// wins. An id leased by [`Registry::begin_action`] rejects all other
/// mutations with `TransientBusy` until the lease is dropped.
pub struct Registry<T: Record> {
    entities: DashMap<String, Slot<T>>,
}

impl<T: Record> Registry<T> {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }

    /// Build an entity from a draft under a fresh id and store it.
    pub fn create(&self, draft: T::Draft) -> Result<T, ServiceError> {
        let entity = T::from_draft(new_id(T::KIND), draft, Utc::now())?;
        self.insert(entity.clone());
        Ok(entity)
    }

    /// Store an already-built entity (used when a service has to reserve
    /// secondary keys between building and storing).
    pub(crate) fn insert(&self, entity: T) {
        self.entities.insert(
            entity.id().to_string(),
            Slot {
                entity,
                busy: false,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entities.get(id).map(|slot| slot.entity.clone())
    }

    /// All entities in creation order.
    pub fn all(&self) -> Vec<T> {
        let mut entities: Vec<T> = self
            .entities
            .iter()
            .map(|slot| slot.value().entity.clone())
            .collect();
        entities.sort_by(|a, b| a.id().cmp(b.id()));
        entities
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.entities
            .iter()
            .find(|slot| predicate(&slot.value().entity))
            .map(|slot| slot.value().entity.clone())
    }

    pub fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.entities
            .iter()
            .filter(|slot| predicate(&slot.value().entity))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Apply `change` to a copy of the entity and commit it with a fresh
    /// `updatedAt`. A failing `change` leaves the canonical entity untouched.
    ///
    /// `change` must not call back into this registry.
    pub fn modify<F>(&self, id: &str, change: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut T) -> Result<(), ServiceError>,
    {
        let mut slot = self
            .entities
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found(T::KIND, id))?;
        if slot.busy {
            return Err(ServiceError::busy(T::KIND, id));
        }
        commit(&mut slot, change)
    }

    /// Merge a client patch.
    pub fn update(&self, id: &str, patch: T::Patch) -> Result<T, ServiceError> {
        self.modify(id, |entity| entity.apply_patch(patch))
    }

    /// Remove the entity if `policy` allows it.
    pub fn remove<F>(&self, id: &str, policy: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&T) -> Result<(), ServiceError>,
    {
        match self.entities.entry(id.to_string()) {
            Entry::Occupied(slot) => {
                if slot.get().busy {
                    return Err(ServiceError::busy(T::KIND, id));
                }
                policy(&slot.get().entity)?;
                Ok(slot.remove().entity)
            }
            Entry::Vacant(_) => Err(ServiceError::not_found(T::KIND, id)),
        }
    }

    /// Mark the entity busy for the duration of an async action.
    pub fn begin_action(&self, id: &str) -> Result<ActionLease<'_, T>, ServiceError> {
        let mut slot = self
            .entities
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found(T::KIND, id))?;
        if slot.busy {
            return Err(ServiceError::busy(T::KIND, id));
        }
        slot.busy = true;

        Ok(ActionLease {
            registry: self,
            id: id.to_string(),
            entity: slot.entity.clone(),
        })
    }
}

impl<T: Record> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn commit<T, F>(slot: &mut Slot<T>, change: F) -> Result<T, ServiceError>
where
    T: Record,
    F: FnOnce(&mut T) -> Result<(), ServiceError>,
{
    let mut next = slot.entity.clone();
    change(&mut next)?;
    next.touch(Utc::now());
    slot.entity = next.clone();
    Ok(next)
}

/// Exclusive hold on one entity while an async action is in flight.
///
/// Dropping the lease (including on early return or cancellation) clears
/// the busy marker.
pub struct ActionLease<'a, T: Record> {
    registry: &'a Registry<T>,
    id: String,
    entity: T,
}

impl<'a, T: Record> ActionLease<'a, T> {
    /// Entity as last seen by the lease holder. Nothing else can change it
    /// while the lease is held.
    pub fn entity(&self) -> &T {
        &self.entity
    }

    /// Publish an intermediate state while keeping the lease.
    pub fn stage<F>(&mut self, change: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut T),
    {
        let mut slot = self
            .registry
            .entities
            .get_mut(&self.id)
            .ok_or_else(|| ServiceError::not_found(T::KIND, self.id.as_str()))?;
        let staged = commit(&mut slot, |entity| {
            change(entity);
            Ok(())
        })?;
        self.entity = staged.clone();
        Ok(staged)
    }

    /// Commit the action's result and release the lease.
    pub fn complete<F>(self, change: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut T) -> Result<(), ServiceError>,
    {
        let mut slot = self
            .registry
            .entities
            .get_mut(&self.id)
            .ok_or_else(|| ServiceError::not_found(T::KIND, self.id.as_str()))?;
        commit(&mut slot, change)
    }

    /// Put back the entity exactly as it was before the action, including
    /// its `updatedAt`, and release the lease.
    ///
    /// Used when the action produced no result, so mirrors that never saw
    /// the staged state stay current.
    pub fn restore(self, original: T) {
        if let Some(mut slot) = self.registry.entities.get_mut(&self.id) {
            slot.entity = original;
        }
    }
}

impl<'a, T: Record> Drop for ActionLease<'a, T> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.registry.entities.get_mut(&self.id) {
            slot.busy = false;
        }
    }
}

/// Secondary unique index (value -> owning entity id).
pub struct UniqueIndex {
    field: &'static str,
    owners: DashMap<String, String>,
}

impl UniqueIndex {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            owners: DashMap::new(),
        }
    }

    /// Claim `value` for `id`. Re-claiming one's own value is a no-op.
    pub fn reserve(&self, value: &str, id: &str) -> Result<(), ServiceError> {
        match self.owners.entry(value.to_string()) {
            Entry::Occupied(owner) if owner.get() != id => Err(ServiceError::conflict(format!(
                "{} '{}' is already in use",
                self.field, value
            ))),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
                Ok(())
            }
        }
    }

    /// Release `value` if `id` owns it.
    pub fn release(&self, value: &str, id: &str) {
        self.owners.remove_if(value, |_, owner| owner == id);
    }

    pub fn owner(&self, value: &str) -> Option<String> {
        self.owners.get(value).map(|owner| owner.value().clone())
    }
}

/// Live ids of a kind that other entities point at.
///
/// Writes that create or move a reference run under the read side, after
/// checking the target is live. Deleting a target runs its reference check
/// and removal under the write side, so a reference can never be added to
/// an entity that is being deleted.
///
/// Lock order: the directory is always taken before any registry shard.
pub struct Directory {
    kind: EntityKind,
    ids: RwLock<HashSet<String>>,
}

impl Directory {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            ids: RwLock::new(HashSet::new()),
        }
    }

    pub fn register(&self, id: &str) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Run `write` with the set of live ids pinned.
    ///
    /// `write` receives a checker that fails with `NotFound` for ids that
    /// are not live.
    pub fn pinned<R, F>(&self, write: F) -> Result<R, ServiceError>
    where
        F: FnOnce(&dyn Fn(&str) -> Result<(), ServiceError>) -> Result<R, ServiceError>,
    {
        let ids = self.ids.read().unwrap_or_else(PoisonError::into_inner);
        let check = |id: &str| {
            if ids.contains(id) {
                Ok(())
            } else {
                Err(ServiceError::not_found(self.kind, id))
            }
        };
        write(&check)
    }

    /// Run `remove` exclusively and retire `id` if it succeeds.
    pub fn retire<R, F>(&self, id: &str, remove: F) -> Result<R, ServiceError>
    where
        F: FnOnce() -> Result<R, ServiceError>,
    {
        let mut ids = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        let removed = remove()?;
        ids.remove(id);
        Ok(removed)
    }
}
