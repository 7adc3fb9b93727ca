pub mod member;

pub use member::{Member, MemberId, MEMBER_META};
