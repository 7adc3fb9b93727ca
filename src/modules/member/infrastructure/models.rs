use crate::schema::member;
use diesel::prelude::*;

#[derive(QueryableByName, Debug, Clone)]
#[diesel(table_name = member)]
pub struct MemberRow {
    pub member_id: i64,
    pub username: String,
    pub age: i32,
    pub team_id: Option<i64>,
}
