use crate::schema::team;
use diesel::prelude::*;

#[derive(QueryableByName, Debug, Clone)]
#[diesel(table_name = team)]
pub struct TeamRow {
    pub team_id: i64,
    pub name: String,
}
