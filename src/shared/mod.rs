// Shared Kernel
// Entity mapping, the query layer and store access used by every module

pub mod application;    // Paging and sorting
pub mod config;         // Environment-driven configuration
pub mod domain;         // Entity traits, tracked handles, repository contract
pub mod errors;         // Shared error types
pub mod infrastructure; // Database, unit of work
pub mod query;          // Derived/explicit queries, specifications, projections
pub mod utils;          // Logging and validation

// Re-exports for convenience
pub use config::AppConfig;
pub use infrastructure::database::Database;
pub use infrastructure::unit_of_work::UnitOfWork;
