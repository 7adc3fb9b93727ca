/// Handles to entities tracked by a unit of work, and the many-to-one relation state
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::entity::Entity;
use crate::shared::errors::{AppError, AppResult};

/// Shared handle to an entity tracked by a unit of work.
///
/// Within one unit of work every identifier maps to exactly one handle, so two
/// lookups of the same row are `ptr_eq`. The handle is `Rc`-based and cannot
/// leave the thread that owns the unit of work.
pub struct Managed<E: Entity> {
    id: E::Id,
    cell: Rc<RefCell<E>>,
}

impl<E: Entity> Managed<E> {
    pub(crate) fn new(id: E::Id, entity: E) -> Self {
        Self {
            id,
            cell: Rc::new(RefCell::new(entity)),
        }
    }

    pub fn id(&self) -> E::Id {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, E> {
        self.cell.borrow()
    }

    /// Changes made through this borrow are flushed before the next query or at commit.
    pub fn borrow_mut(&self) -> RefMut<'_, E> {
        self.cell.borrow_mut()
    }

    /// Detached copy of the current state.
    pub fn get(&self) -> E {
        self.cell.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Managed<E>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn try_borrow(&self) -> AppResult<Ref<'_, E>> {
        self.cell.try_borrow().map_err(|_| {
            AppError::InternalError(format!(
                "{}#{} is mutably borrowed while the unit of work reads it",
                E::meta().name,
                self.id
            ))
        })
    }

    pub(crate) fn try_borrow_mut(&self) -> AppResult<RefMut<'_, E>> {
        self.cell.try_borrow_mut().map_err(|_| {
            AppError::InternalError(format!(
                "{}#{} is borrowed while the unit of work updates it",
                E::meta().name,
                self.id
            ))
        })
    }
}

impl<E: Entity> Clone for Managed<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<E: Entity> fmt::Debug for Managed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(entity) => write!(f, "Managed({:?})", &*entity),
            Err(_) => write!(f, "Managed({}#{}, borrowed)", E::meta().name, self.id),
        }
    }
}

/// Owning side of a many-to-one association.
///
/// `Unloaded` carries only the foreign key; the target is loaded by an explicit
/// `UnitOfWork::fetch` or by a fetch directive on the query.
pub enum Relation<E: Entity> {
    Absent,
    Unloaded(E::Id),
    Loaded(Managed<E>),
}

impl<E: Entity> Relation<E> {
    pub fn from_key(id: Option<E::Id>) -> Self {
        match id {
            Some(id) => Relation::Unloaded(id),
            None => Relation::Absent,
        }
    }

    pub fn id(&self) -> Option<E::Id> {
        match self {
            Relation::Absent => None,
            Relation::Unloaded(id) => Some(*id),
            Relation::Loaded(target) => Some(target.id()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Relation::Loaded(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Relation::Absent)
    }

    /// The loaded target; `None` when absent or not yet fetched.
    pub fn get(&self) -> Option<&Managed<E>> {
        match self {
            Relation::Loaded(target) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, target: &Managed<E>) {
        *self = Relation::Loaded(target.clone());
    }

    pub(crate) fn clear(&mut self) {
        *self = Relation::Absent;
    }
}

impl<E: Entity> Clone for Relation<E> {
    fn clone(&self) -> Self {
        match self {
            Relation::Absent => Relation::Absent,
            Relation::Unloaded(id) => Relation::Unloaded(*id),
            Relation::Loaded(target) => Relation::Loaded(target.clone()),
        }
    }
}

impl<E: Entity> Default for Relation<E> {
    fn default() -> Self {
        Relation::Absent
    }
}

impl<E: Entity> fmt::Debug for Relation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Absent => write!(f, "Absent"),
            Relation::Unloaded(id) => write!(f, "Unloaded({}#{})", E::meta().name, id),
            Relation::Loaded(target) => write!(f, "Loaded({}#{})", E::meta().name, target.id()),
        }
    }
}
