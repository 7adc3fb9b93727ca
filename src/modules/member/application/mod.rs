pub mod projections;

pub use projections::{MemberDto, MemberProjection, NestedClosedProjection, TeamInfo, UsernameOnly, UsernameRow};
