/// Shared domain kernel: entity mapping, tracked handles and the generic repository contract
pub mod entity;
pub mod managed;
pub mod repository;
pub mod value;

pub use entity::{Attribute, AttributeKind, Entity, EntityId, EntityMeta};
pub use managed::{Managed, Relation};
pub use repository::Repository;
pub use value::{Args, Value};
