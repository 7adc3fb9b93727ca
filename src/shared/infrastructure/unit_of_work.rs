/// Transaction-scoped unit of work: identity map, dirty checking and explicit relation loading
use diesel::sqlite::Sqlite;
use diesel::{QueryableByName, SqliteConnection};
use serde::Serialize;
use uuid::Uuid;

use crate::log_debug;
use crate::shared::domain::{Entity, EntityId, Managed, Relation};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::query::sql::{BoundQuery, CountRow, IdRow};
use crate::shared::utils::logger::LogContext;

use super::entity_ops;
use super::identity_map::{EntityKey, IdentityMap};

/// Statement counters for one unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitOfWorkStats {
    /// Every statement sent to the store, flush updates included
    pub statements: u64,
    /// Relations loaded one at a time through `fetch`
    pub lazy_loads: u64,
    pub flushed: u64,
    pub locks: u64,
}

/// Work scoped to one transaction on one pooled connection.
///
/// Created by [`Database::unit_of_work`](super::Database::unit_of_work).
/// Loading the same row twice yields the same [`Managed`] handle, edits to
/// managed entities are written back before the next query and at commit,
/// and relations are only loaded when asked for.
pub struct UnitOfWork<'c> {
    id: Uuid,
    conn: &'c mut SqliteConnection,
    identity_map: IdentityMap,
    stats: UnitOfWorkStats,
}

impl<'c> UnitOfWork<'c> {
    pub(crate) fn new(id: Uuid, conn: &'c mut SqliteConnection) -> Self {
        Self {
            id,
            conn,
            identity_map: IdentityMap::default(),
            stats: UnitOfWorkStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> UnitOfWorkStats {
        self.stats
    }

    pub fn managed_count(&self) -> usize {
        self.identity_map.len()
    }

    pub fn contains<E: Entity>(&self, id: E::Id) -> bool {
        self.identity_map.contains(&EntityKey::of::<E>(id))
    }

    pub fn is_read_only<E: Entity>(&self, entity: &Managed<E>) -> bool {
        self.identity_map
            .is_read_only(&EntityKey::of::<E>(entity.id()))
    }

    /// Insert a new entity, or merge one carrying an identifier.
    ///
    /// An identifier unknown to the store is inserted as given.
    pub fn persist<E: Entity>(&mut self, entity: E) -> AppResult<Managed<E>> {
        entity.validate()?;
        let id = match entity.id() {
            Some(id) => id,
            None => return self.insert(entity, None),
        };

        let existing = match self.identity_map.get::<E>(id) {
            Some(existing) => Some(existing),
            None => self.find::<E>(id)?,
        };

        match existing {
            Some(existing) => {
                *existing.try_borrow_mut()? = entity;
                // An explicit save writes even entities loaded read-only
                let key = EntityKey::of::<E>(id);
                if let Some(entry) = self.identity_map.entry_mut(&key) {
                    entry.set_read_only(false);
                }
                Ok(existing)
            }
            None => self.insert(entity, Some(id)),
        }
    }

    fn insert<E: Entity>(&mut self, mut entity: E, explicit_id: Option<E::Id>) -> AppResult<Managed<E>> {
        let query = entity_ops::insert(&entity, explicit_id);
        let row = self
            .load_rows::<IdRow>(&query)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::InternalError("insert returned no identifier".to_string())
                    .in_query(&query.name)
            })?;

        let id = E::Id::from_raw(row.id);
        entity.assign_id(id);
        let snapshot = entity.column_values();
        let managed = Managed::new(id, entity);
        self.identity_map.insert(managed.clone(), snapshot, false);
        log_debug!("Persisted {}#{}", E::meta().name, id);
        Ok(managed)
    }

    /// Managed instance for `id`; absent when no row matches.
    pub fn find<E: Entity>(&mut self, id: E::Id) -> AppResult<Option<Managed<E>>> {
        if let Some(existing) = self.identity_map.get::<E>(id) {
            return Ok(Some(existing));
        }
        let query = entity_ops::select_by_id(E::meta(), id.raw());
        match self.load_rows::<E::Row>(&query)?.into_iter().next() {
            Some(row) => self.hydrate::<E>(row, false).map(Some),
            None => Ok(None),
        }
    }

    pub fn remove<E: Entity>(&mut self, entity: &Managed<E>) -> AppResult<()> {
        self.remove_by_id::<E>(entity.id()).map(|_| ())
    }

    /// Delete the row for `id` and stop tracking it. Returns the affected row count.
    pub fn remove_by_id<E: Entity>(&mut self, id: E::Id) -> AppResult<usize> {
        self.flush()?;
        let key = EntityKey::of::<E>(id);
        let affected = self.execute(&entity_ops::delete_by_id(E::meta(), key.id))?;
        self.identity_map.remove(&key);
        Ok(affected)
    }

    pub fn remove_all<E: Entity>(&mut self) -> AppResult<usize> {
        self.flush()?;
        let affected = self.execute(&entity_ops::delete_all(E::meta()))?;
        self.identity_map.evict_table(E::meta().table);
        Ok(affected)
    }

    /// Write every changed entity back to the store. Returns how many were updated.
    pub fn flush(&mut self) -> AppResult<usize> {
        let Self {
            conn,
            identity_map,
            stats,
            ..
        } = self;

        let mut flushed = 0;
        for (_, entry) in identity_map.entries_mut() {
            if let Some((query, snapshot)) = entry.pending_update()? {
                stats.statements += 1;
                query.execute(&mut **conn)?;
                entry.set_snapshot(snapshot);
                flushed += 1;
            }
        }

        stats.flushed += flushed as u64;
        Ok(flushed)
    }

    /// Stop tracking everything. Unflushed changes are discarded.
    pub fn clear(&mut self) {
        self.identity_map.clear();
    }

    pub fn detach<E: Entity>(&mut self, entity: &Managed<E>) -> bool {
        self.identity_map.remove(&EntityKey::of::<E>(entity.id()))
    }

    /// Load one unloaded relation of `owner`.
    ///
    /// ```ignore
    /// let team = uow.fetch(&member, Member::team_mut)?;
    /// ```
    pub fn fetch<O: Entity, T: Entity>(
        &mut self,
        owner: &Managed<O>,
        relation: fn(&mut O) -> &mut Relation<T>,
    ) -> AppResult<Option<Managed<T>>> {
        let state = relation(&mut *owner.try_borrow_mut()?).clone();
        let id = match state {
            Relation::Loaded(target) => return Ok(Some(target)),
            Relation::Absent => return Ok(None),
            Relation::Unloaded(id) => id,
        };

        self.stats.lazy_loads += 1;
        LogContext::lazy_load(
            O::meta().name,
            relation_name::<O, T>(),
            T::meta().name,
        );

        let target = self.find::<T>(id)?.ok_or_else(|| {
            AppError::NotFound(format!(
                "{}#{} referenced by {}#{}",
                T::meta().name,
                id,
                O::meta().name,
                owner.id()
            ))
        })?;
        relation(&mut *owner.try_borrow_mut()?).set(&target);
        Ok(Some(target))
    }

    /// Load a relation for many owners with a single select. Returns how many
    /// relations were resolved.
    pub fn fetch_all<O: Entity, T: Entity>(
        &mut self,
        owners: &[Managed<O>],
        relation: fn(&mut O) -> &mut Relation<T>,
    ) -> AppResult<usize> {
        let mut missing: Vec<i64> = Vec::new();
        for owner in owners {
            if let Relation::Unloaded(id) = relation(&mut *owner.try_borrow_mut()?) {
                let raw = id.raw();
                if self.identity_map.get::<T>(*id).is_none() && !missing.contains(&raw) {
                    missing.push(raw);
                }
            }
        }

        if !missing.is_empty() {
            let query = entity_ops::select_by_ids(T::meta(), &missing);
            for row in self.load_rows::<T::Row>(&query)? {
                self.hydrate::<T>(row, false)?;
            }
        }

        let mut resolved = 0;
        for owner in owners {
            let mut entity = owner.try_borrow_mut()?;
            let slot = relation(&mut *entity);
            let pending = match slot {
                Relation::Unloaded(id) => Some(*id),
                _ => None,
            };
            if let Some(target) = pending.and_then(|id| self.identity_map.get::<T>(id)) {
                slot.set(&target);
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Untyped count, e.g. `SELECT COUNT(*) AS count FROM member`.
    pub fn count_rows(&mut self, sql: &str) -> AppResult<u64> {
        let query = BoundQuery::new("native", sql, Vec::new());
        let rows = self.query_rows::<CountRow>(&query)?;
        Ok(rows.first().map(|row| row.count.max(0) as u64).unwrap_or(0))
    }

    /// Run a statement that bypasses the identity map.
    pub fn execute_sql(&mut self, sql: &str) -> AppResult<usize> {
        self.flush()?;
        self.execute(&BoundQuery::new("native", sql, Vec::new()))
    }

    pub(crate) fn load_rows<R>(&mut self, query: &BoundQuery) -> AppResult<Vec<R>>
    where
        R: QueryableByName<Sqlite> + 'static,
    {
        self.stats.statements += 1;
        query.load(self.conn)
    }

    pub(crate) fn execute(&mut self, query: &BoundQuery) -> AppResult<usize> {
        self.stats.statements += 1;
        query.execute(self.conn)
    }

    /// Flush, then load. Queries observe edits not yet written.
    pub(crate) fn query_rows<R>(&mut self, query: &BoundQuery) -> AppResult<Vec<R>>
    where
        R: QueryableByName<Sqlite> + 'static,
    {
        self.flush()?;
        self.load_rows(query)
    }

    pub(crate) fn query_entities<E: Entity>(
        &mut self,
        query: &BoundQuery,
        read_only: bool,
    ) -> AppResult<Vec<Managed<E>>> {
        let rows = self.query_rows::<E::Row>(query)?;
        rows.into_iter()
            .map(|row| self.hydrate::<E>(row, read_only))
            .collect()
    }

    /// Tracked instance for a loaded row. A row already in the map keeps the
    /// in-memory instance, unflushed edits included.
    fn hydrate<E: Entity>(&mut self, row: E::Row, read_only: bool) -> AppResult<Managed<E>> {
        let entity = E::from_row(row);
        let id = entity.id().ok_or_else(|| {
            AppError::InternalError(format!("{} row without an identifier", E::meta().name))
        })?;
        if let Some(existing) = self.identity_map.get::<E>(id) {
            return Ok(existing);
        }
        let snapshot = entity.column_values();
        let managed = Managed::new(id, entity);
        self.identity_map.insert(managed.clone(), snapshot, read_only);
        Ok(managed)
    }

    pub(crate) fn evict_table(&mut self, table: &str) -> usize {
        self.identity_map.evict_table(table)
    }

    /// Take the write lock on the rows `select` returns before it runs.
    pub(crate) fn lock<E: Entity>(&mut self, select: &BoundQuery) -> AppResult<usize> {
        self.flush()?;
        let statement = entity_ops::lock_statement(E::meta(), select);
        let locked = self.execute(&statement)?;
        self.stats.locks += 1;
        Ok(locked)
    }
}

fn relation_name<O: Entity, T: Entity>() -> &'static str {
    O::meta()
        .reference_to(T::meta())
        .map(|attribute| attribute.name)
        .unwrap_or("?")
}
