/// Entity mapping: static table metadata plus the trait every persisted type implements
use diesel::sqlite::Sqlite;
use diesel::QueryableByName;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use super::managed::Managed;
use super::value::Value;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::infrastructure::unit_of_work::UnitOfWork;

/// Store-assigned identifier. Absent until first persist, immutable afterwards.
pub trait EntityId: Copy + Eq + Hash + Debug + Display + Into<Value> + Send + Sync + 'static {
    fn from_raw(raw: i64) -> Self;
    fn raw(self) -> i64;
}

/// Declares an `i64` identifier newtype implementing [`EntityId`].
#[macro_export]
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $crate::shared::domain::EntityId for $name {
            fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            fn raw(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for $crate::shared::domain::Value {
            fn from(id: $name) -> Self {
                $crate::shared::domain::Value::Int(id.0)
            }
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub enum AttributeKind {
    Id,
    Integer,
    Text,
    Boolean,
    /// Many-to-one reference; the column holds the target's identifier
    Reference(&'static EntityMeta),
}

impl AttributeKind {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Id => "id",
            AttributeKind::Integer => "integer",
            AttributeKind::Text => "text",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Reference(_) => "reference",
        }
    }

    /// Whether a bound value is acceptable for a column of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (AttributeKind::Id | AttributeKind::Integer | AttributeKind::Reference(_), Value::Int(_)) => true,
            (AttributeKind::Text, Value::Text(_)) => true,
            (AttributeKind::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Attribute {
    /// Property name used by derived queries, specifications and sorts
    pub name: &'static str,
    pub column: &'static str,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn target(&self) -> Option<&'static EntityMeta> {
        match self.kind {
            AttributeKind::Reference(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Static mapping between an entity type and its table.
#[derive(Debug)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    /// All attributes, identifier first, in column order
    pub attributes: &'static [Attribute],
}

impl EntityMeta {
    pub fn attribute(&self, name: &str) -> Option<&'static Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Non-identifier attributes, in the order `Entity::column_values` yields them.
    pub fn data_attributes(&self) -> impl Iterator<Item = &'static Attribute> {
        self.attributes
            .iter()
            .filter(|a| !matches!(a.kind, AttributeKind::Id))
    }

    /// The reference attribute pointing at `target`, if any.
    pub fn reference_to(&self, target: &EntityMeta) -> Option<&'static Attribute> {
        self.attributes
            .iter()
            .find(|a| matches!(a.target(), Some(meta) if std::ptr::eq(meta, target)))
    }

    /// Column list aliased back to bare column names so rows decode by name.
    pub fn select_columns(&self, alias: &str) -> String {
        self.attributes
            .iter()
            .map(|a| format!("{}.{} AS {}", alias, a.column, a.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Every property path reachable from this entity, one reference level deep.
    pub fn property_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for attribute in self.attributes {
            paths.push(attribute.name.to_string());
            if let Some(target) = attribute.target() {
                for nested in target.attributes {
                    paths.push(format!("{}.{}", attribute.name, nested.name));
                }
            }
        }
        paths
    }

    /// Closest known property to an unresolved token.
    pub fn suggest(&self, token: &str) -> Option<String> {
        let token = token.to_lowercase();
        self.property_paths()
            .into_iter()
            .map(|path| (strsim::levenshtein(&token, &path), path))
            .filter(|(distance, path)| *distance <= std::cmp::max(2, path.len() / 3))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, path)| path)
    }

    pub fn unresolved(&self, method: &str, token: &str) -> AppError {
        AppError::UnresolvedQuery {
            method: method.to_string(),
            token: token.to_string(),
            suggestion: self.suggest(token),
        }
    }
}

/// A persisted domain type.
pub trait Entity: Clone + Debug + 'static {
    type Id: EntityId;
    type Row: QueryableByName<Sqlite> + 'static;

    fn meta() -> &'static EntityMeta;

    fn id(&self) -> Option<Self::Id>;

    /// Called once by the unit of work after the store assigns an identifier.
    fn assign_id(&mut self, id: Self::Id);

    fn from_row(row: Self::Row) -> Self;

    /// Values of `meta().data_attributes()`, in the same order.
    fn column_values(&self) -> Vec<Value>;

    fn validate(&self) -> AppResult<()> {
        Ok(())
    }

    /// Load the relation named by `path` for every entity in one batched statement.
    fn fetch_graph(
        uow: &mut UnitOfWork<'_>,
        entities: &[Managed<Self>],
        path: &str,
    ) -> AppResult<()> {
        let _ = (uow, entities);
        Err(Self::meta().unresolved("fetch", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static OWNER: EntityMeta = EntityMeta {
        name: "Owner",
        table: "owner",
        id_column: "owner_id",
        attributes: &[
            Attribute {
                name: "id",
                column: "owner_id",
                kind: AttributeKind::Id,
            },
            Attribute {
                name: "name",
                column: "name",
                kind: AttributeKind::Text,
            },
        ],
    };

    static PET: EntityMeta = EntityMeta {
        name: "Pet",
        table: "pet",
        id_column: "pet_id",
        attributes: &[
            Attribute {
                name: "id",
                column: "pet_id",
                kind: AttributeKind::Id,
            },
            Attribute {
                name: "nickname",
                column: "nickname",
                kind: AttributeKind::Text,
            },
            Attribute {
                name: "owner",
                column: "owner_id",
                kind: AttributeKind::Reference(&OWNER),
            },
        ],
    };

    #[test]
    fn property_paths_follow_references() {
        let paths = PET.property_paths();
        assert!(paths.contains(&"owner.name".to_string()));
        assert_eq!(PET.data_attributes().count(), 2);
        assert_eq!(PET.reference_to(&OWNER).map(|a| a.name), Some("owner"));
    }

    #[test]
    fn suggestions_pick_the_closest_property() {
        assert_eq!(PET.suggest("nicknam"), Some("nickname".to_string()));
        assert_eq!(PET.suggest("ownername"), Some("owner.name".to_string()));
        assert_eq!(PET.suggest("completely_unrelated"), None);
    }

    #[test]
    fn kinds_check_bound_values() {
        assert!(AttributeKind::Text.accepts(&Value::from("x")));
        assert!(!AttributeKind::Integer.accepts(&Value::from("x")));
        assert!(AttributeKind::Reference(&OWNER).accepts(&Value::Int(1)));
        assert!(AttributeKind::Integer.accepts(&Value::Null));
    }
}
