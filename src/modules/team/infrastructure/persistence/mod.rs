pub mod team_repository_impl;

pub use team_repository_impl::TeamRepositoryImpl;
