/// Per-unit-of-work registry of loaded entities with their last-flushed column values
use std::any::Any;
use std::collections::BTreeMap;

use crate::shared::domain::{Entity, EntityId, Managed, Value};
use crate::shared::errors::AppResult;
use crate::shared::query::sql::BoundQuery;

use super::entity_ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub table: &'static str,
    pub id: i64,
}

impl EntityKey {
    pub fn of<E: Entity>(id: E::Id) -> Self {
        Self {
            table: E::meta().table,
            id: id.raw(),
        }
    }
}

pub(crate) trait TrackedEntry: Any {
    /// Update statement and new snapshot when the entity changed since the last flush.
    fn pending_update(&self) -> AppResult<Option<(BoundQuery, Vec<Value>)>>;
    fn set_snapshot(&mut self, snapshot: Vec<Value>);
    fn is_read_only(&self) -> bool;
    fn set_read_only(&mut self, read_only: bool);
    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct Tracked<E: Entity> {
    pub entity: Managed<E>,
    pub snapshot: Vec<Value>,
    pub read_only: bool,
}

impl<E: Entity> TrackedEntry for Tracked<E> {
    fn pending_update(&self) -> AppResult<Option<(BoundQuery, Vec<Value>)>> {
        if self.read_only {
            return Ok(None);
        }
        let entity = self.entity.try_borrow()?;
        let current = entity.column_values();
        if current == self.snapshot {
            return Ok(None);
        }
        entity.validate()?;
        let query = entity_ops::update::<E>(self.entity.id(), current.clone());
        Ok(Some((query, current)))
    }

    fn set_snapshot(&mut self, snapshot: Vec<Value>) {
        self.snapshot = snapshot;
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One handle per (table, id). Ordered so flushes issue updates deterministically.
#[derive(Default)]
pub(crate) struct IdentityMap {
    entries: BTreeMap<EntityKey, Box<dyn TrackedEntry>>,
}

impl IdentityMap {
    pub fn get<E: Entity>(&self, id: E::Id) -> Option<Managed<E>> {
        self.entries
            .get(&EntityKey::of::<E>(id))
            .and_then(|entry| entry.as_any().downcast_ref::<Tracked<E>>())
            .map(|tracked| tracked.entity.clone())
    }

    pub fn insert<E: Entity>(&mut self, entity: Managed<E>, snapshot: Vec<Value>, read_only: bool) {
        let key = EntityKey::of::<E>(entity.id());
        self.entries.insert(
            key,
            Box::new(Tracked {
                entity,
                snapshot,
                read_only,
            }),
        );
    }

    pub fn remove(&mut self, key: &EntityKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry of `table`; returns how many were evicted.
    pub fn evict_table(&mut self, table: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.table != table);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_read_only(&self, key: &EntityKey) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.is_read_only())
            .unwrap_or(false)
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&EntityKey, &mut Box<dyn TrackedEntry>)> {
        self.entries.iter_mut()
    }

    pub fn entry_mut(&mut self, key: &EntityKey) -> Option<&mut Box<dyn TrackedEntry>> {
        self.entries.get_mut(key)
    }
}
