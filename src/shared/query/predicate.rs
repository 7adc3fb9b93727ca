/// Predicate trees rendered to SQL `WHERE` clauses
use crate::shared::domain::{AttributeKind, Value};
use crate::shared::errors::{AppError, AppResult};

use super::sql::{JoinKind, SelectBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Like => "LIKE",
            Comparison::NotLike => "NOT LIKE",
            Comparison::In => "IN",
            Comparison::NotIn => "NOT IN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row
    Always,
    Compare {
        path: String,
        op: Comparison,
        value: Value,
        ignore_case: bool,
    },
    Between {
        path: String,
        low: Value,
        high: Value,
    },
    Null {
        path: String,
        negated: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(path: &str, op: Comparison, value: Value) -> Self {
        Predicate::Compare {
            path: path.to_string(),
            op,
            value,
            ignore_case: false,
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }

    /// Conjunction; `Always` operands are dropped.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (l, r) => Predicate::And(vec![l, r]),
        }
    }

    /// Disjunction; `Always` operands are dropped, so `Always.or(p) == p`.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (l, r) => Predicate::Or(vec![l, r]),
        }
    }

    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Always => Predicate::Always,
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Render into `builder`, returning the SQL condition text.
    ///
    /// Joins added for dotted paths use `join`. A `Null` value compared with
    /// `=` or `<>` renders as `IS [NOT] NULL`; an empty `IN` list matches nothing.
    pub fn render(&self, builder: &mut SelectBuilder, join: JoinKind) -> AppResult<String> {
        match self {
            Predicate::Always => Ok("1 = 1".to_string()),
            Predicate::Compare {
                path,
                op,
                value,
                ignore_case,
            } => {
                let (column, attribute) = builder.column(path, join)?;
                render_compare(builder, &column, attribute.kind, path, *op, value, *ignore_case)
            }
            Predicate::Between { path, low, high } => {
                let (column, attribute) = builder.column(path, join)?;
                check_kind(builder.query_name(), path, attribute.kind, low)?;
                check_kind(builder.query_name(), path, attribute.kind, high)?;
                let low = builder.bind(low.clone());
                let high = builder.bind(high.clone());
                Ok(format!("{} BETWEEN {} AND {}", column, low, high))
            }
            Predicate::Null { path, negated } => {
                let (column, _) = builder.column(path, join)?;
                Ok(format!(
                    "{} IS {}NULL",
                    column,
                    if *negated { "NOT " } else { "" }
                ))
            }
            Predicate::And(parts) => render_group(builder, join, parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => render_group(builder, join, parts, " OR ", "1 = 0"),
            Predicate::Not(inner) => Ok(format!("NOT ({})", inner.render(builder, join)?)),
        }
    }
}

fn render_group(
    builder: &mut SelectBuilder,
    join: JoinKind,
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) -> AppResult<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(|p| p.render(builder, join).map(|sql| format!("({})", sql)))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(rendered.join(separator))
}

fn check_kind(query: &str, path: &str, kind: AttributeKind, value: &Value) -> AppResult<()> {
    if kind.accepts(value) {
        return Ok(());
    }
    Err(AppError::ParameterBinding(format!(
        "`{}` expects a {} argument for `{}`, got {} {}",
        query,
        kind.name(),
        path,
        value.kind_name(),
        value
    )))
}

fn render_compare(
    builder: &mut SelectBuilder,
    column: &str,
    kind: AttributeKind,
    path: &str,
    op: Comparison,
    value: &Value,
    ignore_case: bool,
) -> AppResult<String> {
    match (op, value) {
        (Comparison::Eq, Value::Null) => return Ok(format!("{} IS NULL", column)),
        (Comparison::Ne, Value::Null) => return Ok(format!("{} IS NOT NULL", column)),
        (Comparison::In | Comparison::NotIn, Value::List(items)) => {
            for item in items {
                check_kind(builder.query_name(), path, kind, item)?;
            }
            if items.is_empty() {
                let matches_all = op == Comparison::NotIn;
                return Ok(if matches_all { "1 = 1" } else { "1 = 0" }.to_string());
            }
        }
        (Comparison::In | Comparison::NotIn, other) => {
            return Err(AppError::ParameterBinding(format!(
                "`{}` expects a list argument for `{}`, got {} {}",
                builder.query_name(),
                path,
                other.kind_name(),
                other
            )));
        }
        (_, Value::List(_)) => {
            return Err(AppError::ParameterBinding(format!(
                "`{}` cannot compare `{}` with a list",
                builder.query_name(),
                path
            )));
        }
        _ => check_kind(builder.query_name(), path, kind, value)?,
    }

    let marker = builder.bind(value.clone());
    if ignore_case {
        Ok(format!("LOWER({}) {} LOWER({})", column, op.as_sql(), marker))
    } else {
        Ok(format!("{} {} {}", column, op.as_sql(), marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;
    use crate::shared::domain::Entity;

    fn render(predicate: &Predicate) -> AppResult<(String, Vec<Value>, String)> {
        let mut builder = SelectBuilder::new("test", Member::meta());
        let sql = predicate.render(&mut builder, JoinKind::Inner)?;
        let from = builder.from_clause();
        let query = builder.finish(sql);
        Ok((query.sql, query.binds, from))
    }

    #[test]
    fn always_is_the_identity_of_composition() {
        let p = Predicate::compare("username", Comparison::Eq, Value::from("AAA"));
        assert_eq!(Predicate::Always.and(p.clone()), p);
        assert_eq!(p.clone().or(Predicate::Always), p);
        assert_eq!(Predicate::Always.negate(), Predicate::Always);
    }

    #[test]
    fn nested_paths_join_and_bind() {
        let p = Predicate::compare("team.name", Comparison::Eq, Value::from("teamA"))
            .and(Predicate::compare("age", Comparison::Gt, Value::Int(5)));
        let (sql, binds, from) = render(&p).unwrap();

        assert_eq!(sql, "(t1.name = ?) AND (t0.age > ?)");
        assert_eq!(binds, vec![Value::from("teamA"), Value::Int(5)]);
        assert!(from.contains("INNER JOIN team t1"));
    }

    #[test]
    fn null_and_empty_list_edge_cases() {
        let (sql, binds, _) =
            render(&Predicate::compare("team", Comparison::Eq, Value::Null)).unwrap();
        assert_eq!(sql, "t0.team_id IS NULL");
        assert!(binds.is_empty());

        let (sql, _, _) =
            render(&Predicate::compare("username", Comparison::In, Value::List(vec![]))).unwrap();
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn mismatched_argument_types_fail_binding() {
        let err = render(&Predicate::compare("age", Comparison::Eq, Value::from("ten")))
            .unwrap_err();
        assert!(matches!(err, AppError::ParameterBinding(_)));

        let err = render(&Predicate::compare("username", Comparison::In, Value::from("AAA")))
            .unwrap_err();
        assert!(matches!(err, AppError::ParameterBinding(_)));
    }
}
