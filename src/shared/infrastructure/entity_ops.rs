/// Statements the unit of work issues on behalf of entities
use crate::shared::domain::{Entity, EntityId, EntityMeta, Value};
use crate::shared::query::sql::{markers, BoundQuery, ROOT_ALIAS};

fn statement_name(meta: &EntityMeta, operation: &str) -> String {
    format!("{}.{}", meta.name, operation)
}

/// `INSERT ... RETURNING` the identifier; an explicit id is inserted as given.
pub(crate) fn insert<E: Entity>(entity: &E, explicit_id: Option<E::Id>) -> BoundQuery {
    let meta = E::meta();
    let mut columns: Vec<&str> = Vec::new();
    let mut binds = Vec::new();

    if let Some(id) = explicit_id {
        columns.push(meta.id_column);
        binds.push(Value::Int(id.raw()));
    }
    for (attribute, value) in meta.data_attributes().zip(entity.column_values()) {
        columns.push(attribute.column);
        binds.push(value);
    }

    BoundQuery::new(
        statement_name(meta, "insert"),
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {} AS id",
            meta.table,
            columns.join(", "),
            markers(binds.len()),
            meta.id_column
        ),
        binds,
    )
}

pub(crate) fn update<E: Entity>(id: E::Id, values: Vec<Value>) -> BoundQuery {
    let meta = E::meta();
    let assignments = meta
        .data_attributes()
        .map(|a| format!("{} = ?", a.column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut binds = values;
    binds.push(Value::Int(id.raw()));

    BoundQuery::new(
        statement_name(meta, "update"),
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            meta.table, assignments, meta.id_column
        ),
        binds,
    )
}

pub(crate) fn delete_by_id(meta: &EntityMeta, id: i64) -> BoundQuery {
    BoundQuery::new(
        statement_name(meta, "delete"),
        format!("DELETE FROM {} WHERE {} = ?", meta.table, meta.id_column),
        vec![Value::Int(id)],
    )
}

pub(crate) fn delete_all(meta: &EntityMeta) -> BoundQuery {
    BoundQuery::new(
        statement_name(meta, "deleteAll"),
        format!("DELETE FROM {}", meta.table),
        Vec::new(),
    )
}

pub(crate) fn select_by_id(meta: &EntityMeta, id: i64) -> BoundQuery {
    BoundQuery::new(
        statement_name(meta, "findById"),
        format!(
            "SELECT {} FROM {} {} WHERE {}.{} = ?",
            meta.select_columns(ROOT_ALIAS),
            meta.table,
            ROOT_ALIAS,
            ROOT_ALIAS,
            meta.id_column
        ),
        vec![Value::Int(id)],
    )
}

pub(crate) fn select_by_ids(meta: &EntityMeta, ids: &[i64]) -> BoundQuery {
    BoundQuery::new(
        statement_name(meta, "findAllById"),
        format!(
            "SELECT {} FROM {} {} WHERE {}.{} IN ({})",
            meta.select_columns(ROOT_ALIAS),
            meta.table,
            ROOT_ALIAS,
            ROOT_ALIAS,
            meta.id_column,
            markers(ids.len())
        ),
        vec![Value::List(ids.iter().map(|id| Value::Int(*id)).collect())],
    )
}

/// No-op update of the rows `select` would return. SQLite has no row locks, so
/// writing takes the database write lock, held until the transaction ends.
pub(crate) fn lock_statement(meta: &EntityMeta, select: &BoundQuery) -> BoundQuery {
    BoundQuery::new(
        format!("{}.lock", select.name),
        format!(
            "UPDATE {table} SET {id} = {id} WHERE {id} IN (SELECT {id} FROM ({select}) AS locked)",
            table = meta.table,
            id = meta.id_column,
            select = select.sql
        ),
        select.binds.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::{Member, MemberId};
    use crate::modules::team::domain::entities::TeamId;

    #[test]
    fn insert_lists_data_columns() {
        let member = Member::with_team_id("member1", 10, TeamId(3));
        let query = insert(&member, None);
        assert_eq!(
            query.sql,
            "INSERT INTO member (username, age, team_id) VALUES (?, ?, ?) RETURNING member_id AS id"
        );
        assert_eq!(
            query.binds,
            vec![Value::from("member1"), Value::Int(10), Value::Int(3)]
        );

        let with_id = insert(&member, Some(MemberId(42)));
        assert!(with_id.sql.starts_with("INSERT INTO member (member_id, username"));
        assert_eq!(with_id.binds[0], Value::Int(42));
    }

    #[test]
    fn update_binds_the_id_last() {
        let query = update::<Member>(MemberId(7), vec![Value::from("a"), Value::Int(1), Value::Null]);
        assert_eq!(
            query.sql,
            "UPDATE member SET username = ?, age = ?, team_id = ? WHERE member_id = ?"
        );
        assert_eq!(query.binds.last(), Some(&Value::Int(7)));
    }

    #[test]
    fn lock_wraps_the_select() {
        let select = BoundQuery::new(
            "findLockByUsername",
            "SELECT t0.member_id AS member_id FROM member t0 WHERE t0.username = ?",
            vec![Value::from("member1")],
        );
        let lock = lock_statement(Member::meta(), &select);
        assert_eq!(
            lock.sql,
            "UPDATE member SET member_id = member_id WHERE member_id IN (SELECT member_id FROM (SELECT t0.member_id AS member_id FROM member t0 WHERE t0.username = ?) AS locked)"
        );
        assert_eq!(lock.binds, select.binds);
    }
}
