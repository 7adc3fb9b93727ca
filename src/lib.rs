pub mod modules;
pub mod schema;
pub mod shared;
