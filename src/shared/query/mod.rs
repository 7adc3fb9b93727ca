/// Query layer: derived and explicit queries, specifications, projections and paging execution
pub mod derived;
pub mod example;
pub mod executor;
pub mod explicit;
pub mod plan;
pub mod predicate;
pub mod projection;
pub mod registry;
pub mod specification;
pub mod sql;

pub use example::Example;
pub use executor::{count_matching, find_matching, find_page_matching, native_query};
pub use plan::{LockMode, QueryDefinition, QueryHints, QueryPlan};
pub use projection::{Accessor, ConstructorProjection, NestedSource, ProjectionHazard, View, ViewPlan, ViewShape};
pub use registry::QueryRegistry;
pub use specification::Specification;
pub use sql::Window;
