use super::entity::Entity;
use super::managed::Managed;
use crate::shared::application::pagination::{Page, PageRequest, Sort};
use crate::shared::errors::{AppResult, OptionExt};
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::query::{count_matching, find_matching, find_page_matching, Example, Specification, Window};

/// Generic repository contract over one entity type.
///
/// Every operation runs inside the caller's unit of work, so lookups share
/// its identity map and writes commit with it. All operations have default
/// implementations; entity repositories add their own queries on top.
pub trait Repository<E: Entity>: Send + Sync {
    /// Insert when unsaved, merge when persisted, insert with the given
    /// identifier when the store does not know it.
    fn save(&self, uow: &mut UnitOfWork<'_>, entity: E) -> AppResult<Managed<E>> {
        uow.persist(entity)
    }

    fn save_all(&self, uow: &mut UnitOfWork<'_>, entities: Vec<E>) -> AppResult<Vec<Managed<E>>> {
        entities
            .into_iter()
            .map(|entity| self.save(uow, entity))
            .collect()
    }

    fn find_by_id(&self, uow: &mut UnitOfWork<'_>, id: E::Id) -> AppResult<Option<Managed<E>>> {
        uow.find(id)
    }

    /// Like `find_by_id`, but absence is a `NotFound` error.
    fn get_by_id(&self, uow: &mut UnitOfWork<'_>, id: E::Id) -> AppResult<Managed<E>> {
        self.find_by_id(uow, id)?
            .or_not_found(|| format!("{} with id {}", E::meta().name, id))
    }

    fn exists_by_id(&self, uow: &mut UnitOfWork<'_>, id: E::Id) -> AppResult<bool> {
        if uow.contains::<E>(id) {
            return Ok(true);
        }
        Ok(count_matching(uow, &Specification::<E>::equal("id", id))? > 0)
    }

    fn find_all(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<E>>> {
        self.find_all_sorted(uow, &Sort::unsorted())
    }

    fn find_all_sorted(&self, uow: &mut UnitOfWork<'_>, sort: &Sort) -> AppResult<Vec<Managed<E>>> {
        find_matching(uow, &Specification::all(), sort, Window::default())
    }

    /// Matching entities; empty, never absent, when nothing matches.
    fn find_all_matching(
        &self,
        uow: &mut UnitOfWork<'_>,
        spec: &Specification<E>,
    ) -> AppResult<Vec<Managed<E>>> {
        find_matching(uow, spec, &Sort::unsorted(), Window::default())
    }

    fn find_all_by_example(
        &self,
        uow: &mut UnitOfWork<'_>,
        example: &Example<E>,
    ) -> AppResult<Vec<Managed<E>>> {
        self.find_all_matching(uow, &example.to_specification())
    }

    fn find_page(&self, uow: &mut UnitOfWork<'_>, request: &PageRequest) -> AppResult<Page<Managed<E>>> {
        find_page_matching(uow, &Specification::all(), request)
    }

    fn find_page_matching(
        &self,
        uow: &mut UnitOfWork<'_>,
        spec: &Specification<E>,
        request: &PageRequest,
    ) -> AppResult<Page<Managed<E>>> {
        find_page_matching(uow, spec, request)
    }

    fn count(&self, uow: &mut UnitOfWork<'_>) -> AppResult<u64> {
        count_matching(uow, &Specification::<E>::all())
    }

    fn count_matching(&self, uow: &mut UnitOfWork<'_>, spec: &Specification<E>) -> AppResult<u64> {
        count_matching(uow, spec)
    }

    fn delete(&self, uow: &mut UnitOfWork<'_>, entity: &Managed<E>) -> AppResult<()> {
        uow.remove(entity)
    }

    /// Silently does nothing when no row has `id`.
    fn delete_by_id(&self, uow: &mut UnitOfWork<'_>, id: E::Id) -> AppResult<()> {
        uow.remove_by_id::<E>(id).map(|_| ())
    }

    /// One `DELETE` for the whole table; returns the affected row count.
    fn delete_all(&self, uow: &mut UnitOfWork<'_>) -> AppResult<usize> {
        uow.remove_all::<E>()
    }
}
