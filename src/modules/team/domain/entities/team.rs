use serde::{Deserialize, Serialize};

use crate::entity_id;
use crate::modules::team::infrastructure::models::TeamRow;
use crate::shared::domain::{Attribute, AttributeKind, Entity, EntityMeta, Value};
use crate::shared::errors::AppResult;
use crate::shared::utils::validation::Validator;

entity_id!(TeamId);

pub static TEAM_META: EntityMeta = EntityMeta {
    name: "Team",
    table: "team",
    id_column: "team_id",
    attributes: &[
        Attribute {
            name: "id",
            column: "team_id",
            kind: AttributeKind::Id,
        },
        Attribute {
            name: "name",
            column: "name",
            kind: AttributeKind::Text,
        },
    ],
};

/// A team. Its members are not stored here; they are the members whose
/// `team` points at this team, see `TeamRepository::members_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    id: Option<TeamId>,
    pub name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }

    /// A team that already has a row, e.g. for an upsert by identifier.
    pub fn persisted(id: TeamId, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
        }
    }
}

impl Entity for Team {
    type Id = TeamId;
    type Row = TeamRow;

    fn meta() -> &'static EntityMeta {
        &TEAM_META
    }

    fn id(&self) -> Option<TeamId> {
        self.id
    }

    fn assign_id(&mut self, id: TeamId) {
        self.id = Some(id);
    }

    fn from_row(row: TeamRow) -> Self {
        Self {
            id: Some(TeamId(row.team_id)),
            name: row.name,
        }
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str())]
    }

    fn validate(&self) -> AppResult<()> {
        Validator::validate_team_name(&self.name)
    }
}
