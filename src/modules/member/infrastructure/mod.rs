pub mod models;
pub mod persistence;

pub use models::MemberRow;
