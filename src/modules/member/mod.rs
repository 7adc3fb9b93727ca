pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

// Re-exports for easy external access
pub use application::MemberDto;
pub use domain::{Member, MemberId, MemberRepository, MemberRepositoryCustom};
pub use infrastructure::persistence::MemberRepositoryImpl;
