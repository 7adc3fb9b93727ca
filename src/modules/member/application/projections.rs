/// Read models over members: constructor rows filled from explicit queries and declared views
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::QueryableByName;
use serde::{Deserialize, Serialize};

use crate::modules::member::domain::entities::Member;
use crate::shared::domain::Managed;
use crate::shared::query::{Accessor, ConstructorProjection, View, ViewShape};

/// Member summary with the name of its team.
#[derive(QueryableByName, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub username: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub team_name: Option<String>,
}

impl ConstructorProjection for MemberDto {
    const NAME: &'static str = "MemberDto";
    const FIELDS: &'static [&'static str] = &["id", "username", "team_name"];
}

impl MemberDto {
    /// Summary of a managed member; the team name is only known once the team is loaded.
    pub fn of(member: &Managed<Member>) -> Self {
        let entity = member.borrow();
        Self {
            id: member.id().0,
            username: entity.username.clone(),
            team_name: entity.team().get().map(|team| team.borrow().name.clone()),
        }
    }
}

#[derive(QueryableByName, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsernameRow {
    #[diesel(sql_type = Text)]
    pub username: String,
}

impl ConstructorProjection for UsernameRow {
    const NAME: &'static str = "UsernameRow";
    const FIELDS: &'static [&'static str] = &["username"];
}

/// Row of the native member projection query.
#[derive(QueryableByName, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberProjection {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub username: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub team_name: Option<String>,
}

impl ConstructorProjection for MemberProjection {
    const NAME: &'static str = "MemberProjection";
    const FIELDS: &'static [&'static str] = &["id", "username", "team_name"];
}

pub static TEAM_INFO: ViewShape = ViewShape {
    name: "TeamInfo",
    accessors: &[Accessor::Attribute("name")],
};

pub static NESTED_CLOSED_PROJECTION: ViewShape = ViewShape {
    name: "NestedClosedProjection",
    accessors: &[
        Accessor::Attribute("username"),
        Accessor::Nested("team", &TEAM_INFO),
    ],
};

pub static USERNAME_ONLY: ViewShape = ViewShape {
    name: "UsernameOnly",
    accessors: &[Accessor::Attribute("username")],
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TeamInfo {
    pub name: String,
}

/// Username plus the member's team, if any.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NestedClosedProjection {
    pub username: String,
    pub team: Option<TeamInfo>,
}

impl View for NestedClosedProjection {
    fn shape() -> &'static ViewShape {
        &NESTED_CLOSED_PROJECTION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsernameOnly {
    pub username: String,
}

impl View for UsernameOnly {
    fn shape() -> &'static ViewShape {
        &USERNAME_ONLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::MemberId;
    use crate::shared::domain::Entity;

    #[test]
    fn dto_of_unloaded_team_has_no_team_name() {
        let mut member = Member::new("member1", 10);
        member.assign_id(MemberId(7));
        let managed = Managed::new(MemberId(7), member);
        assert_eq!(
            MemberDto::of(&managed),
            MemberDto {
                id: 7,
                username: "member1".to_string(),
                team_name: None,
            }
        );
    }
}
