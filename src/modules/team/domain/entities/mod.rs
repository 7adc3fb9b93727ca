pub mod team;

pub use team::{Team, TeamId, TEAM_META};
