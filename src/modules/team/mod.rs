pub mod domain;
pub mod infrastructure;

// Re-exports for easy external access
pub use domain::{Team, TeamId, TeamRepository};
pub use infrastructure::persistence::TeamRepositoryImpl;
