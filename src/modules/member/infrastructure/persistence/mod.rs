pub mod member_repository_custom_impl;
pub mod member_repository_impl;

pub use member_repository_impl::MemberRepositoryImpl;
