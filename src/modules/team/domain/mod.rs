pub mod entities;
pub mod repositories;

// Re-exports for easy access
pub use entities::{Team, TeamId, TEAM_META};
pub use repositories::TeamRepository;
