pub mod entities;
pub mod repositories;
pub mod specs;

// Re-exports for easy access
pub use entities::{Member, MemberId, MEMBER_META};
pub use repositories::{MemberRepository, MemberRepositoryCustom};
