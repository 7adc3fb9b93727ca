/// Shared infrastructure concerns
///
/// Store access and the unit of work shared by every module's repositories.
pub mod database;
pub(crate) mod entity_ops;
pub(crate) mod identity_map;
pub mod unit_of_work;

pub use database::{Database, PoolStatus};
pub use identity_map::EntityKey;
pub use unit_of_work::{UnitOfWork, UnitOfWorkStats};
