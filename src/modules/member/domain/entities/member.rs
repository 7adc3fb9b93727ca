use crate::entity_id;
use crate::modules::member::infrastructure::models::MemberRow;
use crate::modules::team::domain::entities::{Team, TeamId, TEAM_META};
use crate::shared::domain::{Attribute, AttributeKind, Entity, EntityMeta, Managed, Relation, Value};
use crate::shared::errors::AppResult;
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::utils::validation::Validator;

entity_id!(MemberId);

pub static MEMBER_META: EntityMeta = EntityMeta {
    name: "Member",
    table: "member",
    id_column: "member_id",
    attributes: &[
        Attribute {
            name: "id",
            column: "member_id",
            kind: AttributeKind::Id,
        },
        Attribute {
            name: "username",
            column: "username",
            kind: AttributeKind::Text,
        },
        Attribute {
            name: "age",
            column: "age",
            kind: AttributeKind::Integer,
        },
        Attribute {
            name: "team",
            column: "team_id",
            kind: AttributeKind::Reference(&TEAM_META),
        },
    ],
};

/// A member, optionally belonging to one team. The member row owns the
/// foreign key.
#[derive(Debug, Clone)]
pub struct Member {
    id: Option<MemberId>,
    pub username: String,
    pub age: i32,
    team: Relation<Team>,
}

impl Member {
    pub fn new(username: &str, age: i32) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            age,
            team: Relation::Absent,
        }
    }

    pub fn with_team(username: &str, age: i32, team: &Managed<Team>) -> Self {
        let mut member = Self::new(username, age);
        member.change_team(team);
        member
    }

    /// Reference a team by identifier without loading it.
    pub fn with_team_id(username: &str, age: i32, team: TeamId) -> Self {
        let mut member = Self::new(username, age);
        member.team = Relation::Unloaded(team);
        member
    }

    pub fn team(&self) -> &Relation<Team> {
        &self.team
    }

    pub fn team_mut(&mut self) -> &mut Relation<Team> {
        &mut self.team
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team.id()
    }

    pub fn change_team(&mut self, team: &Managed<Team>) {
        self.team.set(team);
    }

    pub fn leave_team(&mut self) {
        self.team.clear();
    }
}

impl Entity for Member {
    type Id = MemberId;
    type Row = MemberRow;

    fn meta() -> &'static EntityMeta {
        &MEMBER_META
    }

    fn id(&self) -> Option<MemberId> {
        self.id
    }

    fn assign_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }

    fn from_row(row: MemberRow) -> Self {
        Self {
            id: Some(MemberId(row.member_id)),
            username: row.username,
            age: row.age,
            team: Relation::from_key(row.team_id.map(TeamId)),
        }
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.username.as_str()),
            Value::from(self.age),
            Value::from(self.team.id()),
        ]
    }

    fn validate(&self) -> AppResult<()> {
        Validator::validate_username(&self.username)?;
        Validator::validate_age(self.age)
    }

    fn fetch_graph(
        uow: &mut UnitOfWork<'_>,
        entities: &[Managed<Self>],
        path: &str,
    ) -> AppResult<()> {
        match path {
            "team" => uow.fetch_all(entities, Member::team_mut).map(|_| ()),
            other => Err(MEMBER_META.unresolved("fetch", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_values_follow_data_attributes() {
        let member = Member::with_team_id("member1", 10, TeamId(2));
        assert_eq!(
            member.column_values(),
            vec![Value::from("member1"), Value::Int(10), Value::Int(2)]
        );
        assert_eq!(MEMBER_META.data_attributes().count(), member.column_values().len());
    }

    #[test]
    fn leaving_a_team_clears_the_foreign_key() {
        let mut member = Member::with_team_id("member1", 10, TeamId(2));
        member.leave_team();
        assert!(member.team().is_absent());
        assert_eq!(member.column_values()[2], Value::Null);
    }

    #[test]
    fn negative_ages_are_rejected() {
        assert!(Member::new("member1", -1).validate().is_err());
        assert!(Member::new("", 1).validate().is_err());
    }
}
