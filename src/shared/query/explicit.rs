/// Explicit SQL queries with `:name`, `?` or `?N` placeholders
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::shared::domain::{Args, Value};
use crate::shared::errors::{AppError, AppResult};

use super::sql::{markers, BoundQuery};

/// String literals are matched first so placeholders inside them are skipped.
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|:([A-Za-z_][A-Za-z0-9_]*)|\?([0-9]+)?"#)
            .unwrap()
    })
}

fn modifying_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:update\s+([A-Za-z_][A-Za-z0-9_]*)|delete\s+from\s+([A-Za-z_][A-Za-z0-9_]*)|insert\s+(?:or\s+[a-z]+\s+)?into\s+([A-Za-z_][A-Za-z0-9_]*))",
        )
        .unwrap()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    None,
    Named,
    Anonymous,
    Numbered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Named(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    /// `UPDATE`, `DELETE` or `INSERT` against `table`
    Modify { table: String },
}

/// A parsed SQL statement, split around its placeholders.
#[derive(Debug, Clone)]
pub struct ExplicitQuery {
    sql: String,
    pieces: Vec<String>,
    slots: Vec<Slot>,
    style: PlaceholderStyle,
    kind: StatementKind,
}

impl ExplicitQuery {
    /// Split `sql` into text and placeholders. Mixing placeholder styles is rejected here,
    /// before any statement runs.
    pub fn parse(query: &str, sql: &str) -> AppResult<Self> {
        let mut pieces = Vec::new();
        let mut slots = Vec::new();
        let mut styles = BTreeSet::new();
        let mut anonymous = 0;
        let mut cursor = 0;

        for captures in placeholder_pattern().captures_iter(sql) {
            let whole = match captures.get(0) {
                Some(m) => m,
                None => continue,
            };
            let slot = if let Some(name) = captures.get(1) {
                styles.insert("named");
                Slot::Named(name.as_str().to_string())
            } else if whole.as_str().starts_with('?') {
                match captures.get(2) {
                    Some(index) => {
                        styles.insert("numbered");
                        let index: usize = index.as_str().parse()?;
                        if index == 0 {
                            return Err(AppError::ParameterBinding(format!(
                                "`{}`: positional placeholders start at ?1",
                                query
                            )));
                        }
                        Slot::Index(index - 1)
                    }
                    None => {
                        styles.insert("anonymous");
                        anonymous += 1;
                        Slot::Index(anonymous - 1)
                    }
                }
            } else {
                // string literal
                continue;
            };

            pieces.push(sql[cursor..whole.start()].to_string());
            slots.push(slot);
            cursor = whole.end();
        }
        pieces.push(sql[cursor..].to_string());

        if styles.len() > 1 {
            return Err(AppError::ParameterBinding(format!(
                "`{}` mixes {} placeholders",
                query,
                styles.into_iter().collect::<Vec<_>>().join(" and ")
            )));
        }

        let style = match styles.into_iter().next() {
            Some("named") => PlaceholderStyle::Named,
            Some("numbered") => PlaceholderStyle::Numbered,
            Some(_) => PlaceholderStyle::Anonymous,
            None => PlaceholderStyle::None,
        };

        if style == PlaceholderStyle::Numbered {
            let used: BTreeSet<usize> = slots
                .iter()
                .filter_map(|s| match s {
                    Slot::Index(i) => Some(*i),
                    Slot::Named(_) => None,
                })
                .collect();
            if let Some(missing) = (0..used.len()).find(|i| !used.contains(i)) {
                return Err(AppError::ParameterBinding(format!(
                    "`{}` skips placeholder ?{}",
                    query,
                    missing + 1
                )));
            }
        }

        let kind = match modifying_pattern().captures(sql) {
            Some(captures) => StatementKind::Modify {
                table: (1..=3)
                    .find_map(|i| captures.get(i))
                    .map(|m| m.as_str().to_lowercase())
                    .unwrap_or_default(),
            },
            None => StatementKind::Select,
        };

        Ok(Self {
            sql: sql.to_string(),
            pieces,
            slots,
            style,
            kind,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn is_modifying(&self) -> bool {
        matches!(self.kind, StatementKind::Modify { .. })
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for slot in &self.slots {
            if let Slot::Named(name) = slot {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Number of distinct arguments the statement consumes.
    pub fn arity(&self) -> usize {
        match self.style {
            PlaceholderStyle::None => 0,
            PlaceholderStyle::Named => self.parameter_names().len(),
            PlaceholderStyle::Anonymous | PlaceholderStyle::Numbered => self
                .slots
                .iter()
                .filter_map(|s| match s {
                    Slot::Index(i) => Some(i + 1),
                    Slot::Named(_) => None,
                })
                .max()
                .unwrap_or(0),
        }
    }

    /// Number of top-level select-list columns; `None` for `*` selects or non-selects.
    pub fn select_arity(&self) -> Option<usize> {
        select_list_arity(&self.sql)
    }

    /// Bind call arguments. `strict` rejects unused named arguments and surplus
    /// positional ones; count queries bind leniently against the content query's arguments.
    pub fn bind(&self, query: &str, args: &Args, strict: bool) -> AppResult<BoundQuery> {
        let mismatch = |message: String| AppError::ParameterBinding(format!("`{}` {}", query, message));

        match self.style {
            PlaceholderStyle::None => {
                if strict && !args.is_empty() {
                    return Err(mismatch("takes no arguments".to_string()));
                }
            }
            PlaceholderStyle::Named => {
                if !args.positional().is_empty() {
                    return Err(mismatch("uses named parameters but got positional arguments".to_string()));
                }
                if strict {
                    let names = self.parameter_names();
                    if let Some(unknown) = args.names().find(|n| !names.contains(n)) {
                        return Err(mismatch(format!("has no parameter :{}", unknown)));
                    }
                }
            }
            PlaceholderStyle::Anonymous | PlaceholderStyle::Numbered => {
                if args.has_named() {
                    return Err(mismatch("uses positional parameters but got named arguments".to_string()));
                }
                let supplied = args.positional().len();
                let expected = self.arity();
                if supplied < expected || (strict && supplied != expected) {
                    return Err(mismatch(format!(
                        "expects {} argument(s), got {}",
                        expected, supplied
                    )));
                }
            }
        }

        let mut sql = String::with_capacity(self.sql.len());
        let mut binds = Vec::with_capacity(self.slots.len());
        sql.push_str(&self.pieces[0]);

        for (i, slot) in self.slots.iter().enumerate() {
            let value = match slot {
                Slot::Named(name) => args
                    .named(name)
                    .ok_or_else(|| mismatch(format!("is missing parameter :{}", name)))?,
                Slot::Index(index) => &args.positional()[*index],
            };
            let after = &self.pieces[i + 1];
            let marker = list_marker(&sql, after, value);
            sql.push_str(&marker);
            sql.push_str(after);
            binds.push(value.clone());
        }

        Ok(BoundQuery::new(query, sql, binds))
    }
}

/// Marker text for one argument. Lists expand to one marker per element and get
/// parentheses unless the statement already wraps the placeholder in them.
fn list_marker(before: &str, after: &str, value: &Value) -> String {
    match value {
        Value::List(items) => {
            let wrapped = before.trim_end().ends_with('(') && after.trim_start().starts_with(')');
            if wrapped {
                markers(items.len())
            } else {
                format!("({})", markers(items.len()))
            }
        }
        _ => "?".to_string(),
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn keyword_at(bytes: &[u8], at: usize, keyword: &str) -> bool {
    let end = at + keyword.len();
    end <= bytes.len()
        && bytes[at..end].eq_ignore_ascii_case(keyword.as_bytes())
        && (at == 0 || !is_word_byte(bytes[at - 1]))
        && (end == bytes.len() || !is_word_byte(bytes[end]))
}

fn select_list_arity(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let start = sql.len() - sql.trim_start().len();
    if !keyword_at(bytes, start, "select") {
        return None;
    }

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut item_start = start + "select".len();
    let mut i = item_start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                items.push(&sql[item_start..i]);
                item_start = i + 1;
            }
            _ if depth == 0 && keyword_at(bytes, i, "from") => break,
            _ => {}
        }
        i += 1;
    }
    items.push(&sql[item_start..i]);

    let first = items[0].trim_start();
    if first
        .get(..8)
        .is_some_and(|word| word.eq_ignore_ascii_case("distinct"))
    {
        items[0] = &first[8..];
    }

    let items: Vec<&str> = items.iter().map(|s| s.trim()).collect();
    if items.iter().any(|s| s.is_empty() || *s == "*" || s.ends_with(".*")) {
        return None;
    }
    Some(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_placeholders_bind_by_name() {
        let query = ExplicitQuery::parse(
            "findUser",
            "SELECT m.* FROM member m WHERE m.username = :username AND m.age = :age",
        )
        .unwrap();
        assert_eq!(query.style(), PlaceholderStyle::Named);
        assert_eq!(query.parameter_names(), vec!["username", "age"]);

        let bound = query
            .bind("findUser", &Args::new().bind("age", 10).bind("username", "AAA"), true)
            .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT m.* FROM member m WHERE m.username = ? AND m.age = ?"
        );
        assert_eq!(bound.binds, vec![Value::from("AAA"), Value::Int(10)]);
    }

    #[test]
    fn placeholders_inside_literals_are_ignored() {
        let query = ExplicitQuery::parse(
            "q",
            "SELECT * FROM member WHERE username = 'what?' AND note <> ':x''s' AND age = ?",
        )
        .unwrap();
        assert_eq!(query.style(), PlaceholderStyle::Anonymous);
        assert_eq!(query.arity(), 1);
    }

    #[test]
    fn mixed_styles_are_rejected() {
        let err = ExplicitQuery::parse("q", "SELECT * FROM member WHERE username = :name AND age = ?")
            .unwrap_err();
        assert!(matches!(err, AppError::ParameterBinding(_)));
        assert!(ExplicitQuery::parse("q", "SELECT * FROM member WHERE age = ?2").is_err());
    }

    #[test]
    fn argument_mismatches_fail_binding() {
        let query = ExplicitQuery::parse("q", "SELECT * FROM member WHERE age = ?1 OR age > ?1").unwrap();
        assert_eq!(query.arity(), 1);
        assert!(query.bind("q", &Args::new(), true).is_err());
        assert!(query.bind("q", &Args::new().arg(1).arg(2), true).is_err());
        assert!(query.bind("q", &Args::new().bind("age", 1), true).is_err());

        let bound = query.bind("q", &Args::new().arg(7), true).unwrap();
        assert_eq!(bound.binds, vec![Value::Int(7), Value::Int(7)]);

        let named = ExplicitQuery::parse("q", "SELECT * FROM member WHERE age = :age").unwrap();
        assert!(named.bind("q", &Args::new(), true).is_err());
        assert!(named
            .bind("q", &Args::new().bind("age", 1).bind("extra", 2), true)
            .is_err());
        assert!(named
            .bind("q", &Args::new().bind("age", 1).bind("extra", 2), false)
            .is_ok());
    }

    #[test]
    fn collection_arguments_expand() {
        let bare = ExplicitQuery::parse("q", "SELECT * FROM member m WHERE m.username IN :names").unwrap();
        let bound = bare
            .bind("q", &Args::new().bind("names", vec!["AAA", "BBB"]), true)
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM member m WHERE m.username IN (?, ?)");

        let wrapped = ExplicitQuery::parse("q", "SELECT * FROM member m WHERE m.username IN (:names)").unwrap();
        let bound = wrapped
            .bind("q", &Args::new().bind("names", vec!["AAA"]), true)
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM member m WHERE m.username IN (?)");
    }

    #[test]
    fn statement_kinds() {
        let update = ExplicitQuery::parse("q", "update member set age = age + 1 where age >= :age").unwrap();
        assert_eq!(
            update.kind(),
            &StatementKind::Modify {
                table: "member".to_string()
            }
        );
        let select = ExplicitQuery::parse("q", "SELECT m.username FROM member m").unwrap();
        assert!(!select.is_modifying());
    }

    #[test]
    fn select_list_arity_counts_top_level_columns() {
        assert_eq!(
            select_list_arity("SELECT m.member_id AS id, m.username, t.name FROM member m JOIN team t ON t.team_id = m.team_id"),
            Some(3)
        );
        assert_eq!(
            select_list_arity("select distinct coalesce(t.name, 'a,b'), count(*) from member m"),
            Some(2)
        );
        assert_eq!(select_list_arity("SELECT m.* FROM member m"), None);
        assert_eq!(select_list_arity("UPDATE member SET age = 1"), None);
    }
}
