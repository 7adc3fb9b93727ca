/// Bound statements and the select builder shared by every query path
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::sqlite::Sqlite;

use crate::shared::application::pagination::Sort;
use crate::shared::domain::{Attribute, EntityMeta, Value};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::LogContext;

pub const ROOT_ALIAS: &str = "t0";

/// Helper struct for COUNT queries
#[derive(QueryableByName, Debug)]
pub(crate) struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Identifier returned by `INSERT ... RETURNING`
#[derive(QueryableByName, Debug)]
pub(crate) struct IdRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
}

/// SQL text with its arguments, tagged with the query it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub name: String,
    pub sql: String,
    pub binds: Vec<Value>,
}

type Boxed = BoxedSqlQuery<'static, Sqlite, SqlQuery>;

fn push_bind(query: Boxed, value: &Value) -> Boxed {
    match value {
        Value::Null => query.bind::<Nullable<BigInt>, _>(None::<i64>),
        Value::Int(v) => query.bind::<BigInt, _>(*v),
        Value::Text(v) => query.bind::<Text, _>(v.clone()),
        Value::Bool(v) => query.bind::<Bool, _>(*v),
        Value::List(items) => items.iter().fold(query, push_bind),
    }
}

impl BoundQuery {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            binds,
        }
    }

    fn boxed(&self) -> Boxed {
        self.binds
            .iter()
            .fold(diesel::sql_query(self.sql.clone()).into_boxed::<Sqlite>(), push_bind)
    }

    fn bind_count(&self) -> usize {
        self.binds.iter().map(Value::bind_width).sum()
    }

    pub(crate) fn load<R>(&self, conn: &mut SqliteConnection) -> AppResult<Vec<R>>
    where
        R: QueryableByName<Sqlite> + 'static,
    {
        LogContext::statement(&self.name, &self.sql, self.bind_count());
        self.boxed()
            .load::<R>(conn)
            .map_err(|e| AppError::from(e).in_query(&self.name))
    }

    pub(crate) fn execute(&self, conn: &mut SqliteConnection) -> AppResult<usize> {
        LogContext::statement(&self.name, &self.sql, self.bind_count());
        self.boxed()
            .execute(conn)
            .map_err(|e| AppError::from(e).in_query(&self.name))
    }
}

/// `?, ?, ?` for `n` arguments.
pub fn markers(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Row window appended as `LIMIT ? OFFSET ?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Window {
    pub fn limit(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }

    pub fn range(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    path: String,
    alias: String,
    meta: &'static EntityMeta,
    parent_alias: String,
    column: &'static str,
    kind: JoinKind,
}

/// Accumulates joins and arguments while a select over one root entity is rendered.
///
/// Property paths are dotted attribute names (`team.name`); each reference
/// segment adds one join, shared by every clause that walks the same path.
#[derive(Debug)]
pub struct SelectBuilder {
    query: String,
    root: &'static EntityMeta,
    joins: Vec<Join>,
    binds: Vec<Value>,
}

impl SelectBuilder {
    pub fn new(query: &str, root: &'static EntityMeta) -> Self {
        Self {
            query: query.to_string(),
            root,
            joins: Vec::new(),
            binds: Vec::new(),
        }
    }

    pub fn root(&self) -> &'static EntityMeta {
        self.root
    }

    pub fn query_name(&self) -> &str {
        &self.query
    }

    /// Record an argument and return its marker.
    pub fn bind(&mut self, value: Value) -> String {
        let marker = match &value {
            Value::List(items) => format!("({})", markers(items.len())),
            _ => "?".to_string(),
        };
        self.binds.push(value);
        marker
    }

    /// Alias of the joined entity at `path`, adding joins as needed.
    pub fn join(&mut self, path: &str, kind: JoinKind) -> AppResult<(String, &'static EntityMeta)> {
        let mut alias = ROOT_ALIAS.to_string();
        let mut meta = self.root;
        let mut prefix = String::new();

        for segment in path.split('.') {
            let attribute = meta
                .attribute(segment)
                .ok_or_else(|| self.root.unresolved(&self.query, path))?;
            let target = attribute
                .target()
                .ok_or_else(|| self.root.unresolved(&self.query, path))?;

            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);

            alias = match self.joins.iter().find(|j| j.path == prefix) {
                Some(existing) => existing.alias.clone(),
                None => {
                    let join_alias = format!("t{}", self.joins.len() + 1);
                    self.joins.push(Join {
                        path: prefix.clone(),
                        alias: join_alias.clone(),
                        meta: target,
                        parent_alias: alias,
                        column: attribute.column,
                        kind,
                    });
                    join_alias
                }
            };
            meta = target;
        }

        Ok((alias, meta))
    }

    /// Qualified column for a property path, joining intermediate references.
    pub fn column(&mut self, path: &str, kind: JoinKind) -> AppResult<(String, &'static Attribute)> {
        let (parent, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, path),
        };

        let (alias, meta) = match parent {
            Some(parent) => self.join(parent, kind)?,
            None => (ROOT_ALIAS.to_string(), self.root),
        };

        let attribute = meta
            .attribute(leaf)
            .ok_or_else(|| self.root.unresolved(&self.query, path))?;

        Ok((format!("{}.{}", alias, attribute.column), attribute))
    }

    pub fn order_clause(&mut self, sort: &Sort) -> AppResult<String> {
        if sort.is_unsorted() {
            return Ok(String::new());
        }
        let mut keys = Vec::with_capacity(sort.orders().len());
        for order in sort.orders() {
            let (column, _) = self.column(&order.property, JoinKind::Left)?;
            keys.push(format!("{} {}", column, order.direction.as_sql()));
        }
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }

    pub fn window_clause(&mut self, window: Window) -> String {
        match window.limit {
            Some(limit) => {
                self.binds.push(Value::Int(limit as i64));
                self.binds.push(Value::Int(window.offset as i64));
                " LIMIT ? OFFSET ?".to_string()
            }
            None if window.offset > 0 => {
                self.binds.push(Value::Int(window.offset as i64));
                " LIMIT -1 OFFSET ?".to_string()
            }
            None => String::new(),
        }
    }

    pub fn from_clause(&self) -> String {
        let mut from = format!("{} {}", self.root.table, ROOT_ALIAS);
        for join in &self.joins {
            from.push_str(&format!(
                " {} {} {} ON {}.{} = {}.{}",
                join.kind.as_sql(),
                join.meta.table,
                join.alias,
                join.alias,
                join.meta.id_column,
                join.parent_alias,
                join.column
            ));
        }
        from
    }

    pub fn finish(self, sql: String) -> BoundQuery {
        BoundQuery::new(self.query, sql, self.binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;
    use crate::shared::application::pagination::Order;
    use crate::shared::domain::Entity;

    #[test]
    fn paths_share_one_join() {
        let mut builder = SelectBuilder::new("test", Member::meta());
        let (name, _) = builder.column("team.name", JoinKind::Inner).unwrap();
        let (id, _) = builder.column("team.id", JoinKind::Left).unwrap();

        assert_eq!(name, "t1.name");
        assert_eq!(id, "t1.team_id");
        assert_eq!(
            builder.from_clause(),
            "member t0 INNER JOIN team t1 ON t1.team_id = t0.team_id"
        );
    }

    #[test]
    fn unknown_paths_are_unresolved() {
        let mut builder = SelectBuilder::new("test", Member::meta());
        let err = builder.column("team.nam", JoinKind::Inner).unwrap_err();
        match err {
            AppError::UnresolvedQuery { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("team.name"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(builder.column("username.name", JoinKind::Inner).is_err());
    }

    #[test]
    fn order_and_window_bind_in_sequence() {
        let mut builder = SelectBuilder::new("test", Member::meta());
        let marker = builder.bind(Value::from("AAA"));
        let order = builder
            .order_clause(&Sort::by(Order::desc("username")).and(Order::asc("age")))
            .unwrap();
        let window = builder.window_clause(Window::range(6, 3));
        let query = builder.finish(format!("x = {}{}{}", marker, order, window));

        assert_eq!(
            query.sql,
            "x = ? ORDER BY t0.username DESC, t0.age ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            query.binds,
            vec![Value::from("AAA"), Value::Int(3), Value::Int(6)]
        );
    }

    #[test]
    fn list_binds_expand_markers() {
        let mut builder = SelectBuilder::new("test", Member::meta());
        assert_eq!(builder.bind(Value::from(vec![1, 2, 3])), "(?, ?, ?)");
        assert_eq!(markers(2), "?, ?");
    }
}
