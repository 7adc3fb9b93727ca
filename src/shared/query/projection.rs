/// Projections: constructor-style rows and declared view shapes
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::QueryableByName;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::shared::domain::{Attribute, AttributeKind, EntityMeta, Value};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::utils::logger::LogContext;
use crate::shared::utils::validation::Validator;

use super::plan::QueryPlan;
use super::sql::{BoundQuery, JoinKind, SelectBuilder, ROOT_ALIAS};

/// A row type filled column-by-name from an explicit query's select list.
///
/// `FIELDS` declares the expected columns in order; registering a query whose
/// select list has a different length fails with `ProjectionArity`.
pub trait ConstructorProjection: QueryableByName<Sqlite> + 'static {
    const NAME: &'static str;
    const FIELDS: &'static [&'static str];
}

#[derive(Debug)]
pub struct ViewShape {
    pub name: &'static str,
    pub accessors: &'static [Accessor],
}

#[derive(Debug, Clone, Copy)]
pub enum Accessor {
    /// Scalar attribute of the entity
    Attribute(&'static str),
    /// Reference attribute mapped into a nested view
    Nested(&'static str, &'static ViewShape),
}

/// A read-only view over an entity, deserialized from the accessors its shape declares.
pub trait View: DeserializeOwned + 'static {
    fn shape() -> &'static ViewShape;
}

/// A nested view populated with one extra select per outer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionHazard {
    pub query: String,
    pub view: &'static str,
    pub accessor: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedSource {
    /// Columns come from the join the query's fetch directive adds
    Join,
    /// One select per outer row
    PerRow,
}

#[derive(Debug)]
struct NestedView {
    accessor: &'static str,
    relation: &'static Attribute,
    target: &'static EntityMeta,
    fields: Vec<&'static Attribute>,
    source: NestedSource,
}

/// Resolved mapping from one query's root entity to a view shape.
#[derive(Debug)]
pub struct ViewPlan {
    query: String,
    view: &'static str,
    fields: Vec<&'static Attribute>,
    nested: Vec<NestedView>,
    hazards: Vec<ProjectionHazard>,
}

#[derive(QueryableByName, Debug)]
struct ViewRow {
    #[diesel(sql_type = Text)]
    view: String,
}

const PRESENT: &str = "$present";
const FOREIGN_KEY: &str = "$id";

fn json_pairs(pairs: &[(String, String)]) -> String {
    let args = pairs
        .iter()
        .map(|(key, expr)| format!("'{}', {}", key, expr))
        .collect::<Vec<_>>()
        .join(", ");
    format!("json_object({})", args)
}

fn flat_field(attribute: &Attribute, raw: Json) -> Json {
    match (attribute.kind, raw) {
        (AttributeKind::Boolean, Json::Number(n)) => Json::Bool(n.as_i64().unwrap_or(0) != 0),
        (_, raw) => raw,
    }
}

impl ViewPlan {
    pub fn resolve(
        plan: &QueryPlan,
        root: &'static EntityMeta,
        shape: &'static ViewShape,
    ) -> AppResult<Self> {
        let mut fields = Vec::new();
        let mut nested = Vec::new();
        let mut hazards = Vec::new();

        for accessor in shape.accessors {
            match *accessor {
                Accessor::Attribute(name) => {
                    Validator::validate_identifier(name)?;
                    let attribute = root
                        .attribute(name)
                        .ok_or_else(|| root.unresolved(&plan.name, name))?;
                    fields.push(attribute);
                }
                Accessor::Nested(name, nested_shape) => {
                    Validator::validate_identifier(name)?;
                    let relation = root
                        .attribute(name)
                        .ok_or_else(|| root.unresolved(&plan.name, name))?;
                    let target = relation.target().ok_or_else(|| {
                        AppError::InvalidInput(format!(
                            "`{}.{}` is not a relation and cannot map to a nested view",
                            shape.name, name
                        ))
                    })?;

                    let mut nested_fields = Vec::new();
                    for inner in nested_shape.accessors {
                        match *inner {
                            Accessor::Attribute(field) => {
                                Validator::validate_identifier(field)?;
                                let attribute = target.attribute(field).ok_or_else(|| {
                                    root.unresolved(&plan.name, &format!("{}.{}", name, field))
                                })?;
                                nested_fields.push(attribute);
                            }
                            Accessor::Nested(field, _) => {
                                return Err(AppError::InvalidInput(format!(
                                    "`{}.{}.{}`: views nest one level deep",
                                    shape.name, name, field
                                )));
                            }
                        }
                    }

                    let source = if plan.hints.fetches(name) {
                        NestedSource::Join
                    } else {
                        hazards.push(ProjectionHazard {
                            query: plan.name.clone(),
                            view: shape.name,
                            accessor: name,
                        });
                        NestedSource::PerRow
                    };

                    nested.push(NestedView {
                        accessor: name,
                        relation,
                        target,
                        fields: nested_fields,
                        source,
                    });
                }
            }
        }

        for hazard in &hazards {
            LogContext::projection_hazard(&hazard.query, hazard.view, hazard.accessor);
        }

        Ok(Self {
            query: plan.name.clone(),
            view: shape.name,
            fields,
            nested,
            hazards,
        })
    }

    pub fn view(&self) -> &'static str {
        self.view
    }

    /// Nested accessors that cost one extra select per outer row.
    pub fn hazards(&self) -> &[ProjectionHazard] {
        &self.hazards
    }

    pub fn source_of(&self, accessor: &str) -> Option<NestedSource> {
        self.nested
            .iter()
            .find(|n| n.accessor == accessor)
            .map(|n| n.source)
    }

    /// `json_object(...)` select expression; adds the joins for joined nested views.
    pub(crate) fn select_list(&self, builder: &mut SelectBuilder) -> AppResult<String> {
        let mut pairs = Vec::new();
        for field in &self.fields {
            pairs.push((
                field.name.to_string(),
                format!("{}.{}", ROOT_ALIAS, field.column),
            ));
        }
        for nested in &self.nested {
            match nested.source {
                NestedSource::Join => {
                    let (alias, meta) = builder.join(nested.accessor, JoinKind::Left)?;
                    for field in &nested.fields {
                        pairs.push((
                            format!("{}.{}", nested.accessor, field.name),
                            format!("{}.{}", alias, field.column),
                        ));
                    }
                    pairs.push((
                        format!("{}.{}", nested.accessor, PRESENT),
                        format!("{}.{} IS NOT NULL", alias, meta.id_column),
                    ));
                }
                NestedSource::PerRow => {
                    pairs.push((
                        format!("{}.{}", nested.accessor, FOREIGN_KEY),
                        format!("{}.{}", ROOT_ALIAS, nested.relation.column),
                    ));
                }
            }
        }
        Ok(format!("{} AS view", json_pairs(&pairs)))
    }

    fn nested_select(&self, nested: &NestedView, id: i64) -> BoundQuery {
        let pairs = nested
            .fields
            .iter()
            .map(|f| (f.name.to_string(), format!("{}.{}", ROOT_ALIAS, f.column)))
            .collect::<Vec<_>>();
        BoundQuery::new(
            format!("{}.{}", self.query, nested.accessor),
            format!(
                "SELECT {} AS view FROM {} {} WHERE {}.{} = ?",
                json_pairs(&pairs),
                nested.target.table,
                ROOT_ALIAS,
                ROOT_ALIAS,
                nested.target.id_column
            ),
            vec![Value::Int(id)],
        )
    }

    /// Run `query` (built with `select_list`) and map each row to `V`.
    pub(crate) fn load<V: View>(
        &self,
        uow: &mut UnitOfWork<'_>,
        query: &BoundQuery,
    ) -> AppResult<Vec<V>> {
        let rows = uow.query_rows::<ViewRow>(query)?;
        let mut views = Vec::with_capacity(rows.len());

        for row in rows {
            let mut flat: Map<String, Json> = serde_json::from_str(&row.view)?;
            let mut object = Map::new();

            for field in &self.fields {
                let raw = flat.remove(field.name).unwrap_or(Json::Null);
                object.insert(field.name.to_string(), flat_field(field, raw));
            }

            for nested in &self.nested {
                let value = match nested.source {
                    NestedSource::Join => {
                        let present = flat
                            .remove(&format!("{}.{}", nested.accessor, PRESENT))
                            .and_then(|v| v.as_i64())
                            .unwrap_or(0)
                            != 0;
                        if present {
                            let mut inner = Map::new();
                            for field in &nested.fields {
                                let key = format!("{}.{}", nested.accessor, field.name);
                                let raw = flat.remove(&key).unwrap_or(Json::Null);
                                inner.insert(field.name.to_string(), flat_field(field, raw));
                            }
                            Json::Object(inner)
                        } else {
                            Json::Null
                        }
                    }
                    NestedSource::PerRow => {
                        let key = flat
                            .remove(&format!("{}.{}", nested.accessor, FOREIGN_KEY))
                            .and_then(|v| v.as_i64());
                        match key {
                            Some(id) => {
                                let sub = self.nested_select(nested, id);
                                match uow.load_rows::<ViewRow>(&sub)?.into_iter().next() {
                                    Some(inner) => {
                                        let mut inner: Map<String, Json> =
                                            serde_json::from_str(&inner.view)?;
                                        for field in &nested.fields {
                                            if let Some(raw) = inner.remove(field.name) {
                                                inner.insert(
                                                    field.name.to_string(),
                                                    flat_field(field, raw),
                                                );
                                            }
                                        }
                                        Json::Object(inner)
                                    }
                                    None => Json::Null,
                                }
                            }
                            None => Json::Null,
                        }
                    }
                };
                object.insert(nested.accessor.to_string(), value);
            }

            let view = serde_json::from_value::<V>(Json::Object(object))
                .map_err(|e| AppError::from(e).in_query(&self.query))?;
            views.push(view);
        }

        Ok(views)
    }
}
