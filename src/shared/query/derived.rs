/// Query plans derived from repository method names such as `findByUsernameAndAgeGreaterThan`
use regex::Regex;
use std::sync::OnceLock;

use crate::shared::application::pagination::{Direction, Order, Sort};
use crate::shared::domain::{Attribute, AttributeKind, EntityMeta, Value};
use crate::shared::errors::{AppError, AppResult};

use super::predicate::{Comparison, Predicate};

fn method_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(find|read|get|query|count|exists|delete)([A-Za-z0-9]*?)(?:By([A-Za-z0-9]*))?$")
            .unwrap()
    })
}

fn limit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:Top|First)(\d*)").unwrap())
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Z][a-z0-9]*|[a-z0-9]+").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAction {
    Select,
    Count,
    Exists,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    pub fn arity(&self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::IsNull | Operator::IsNotNull | Operator::True | Operator::False => 0,
            _ => 1,
        }
    }

    fn needs_text(&self) -> bool {
        matches!(
            self,
            Operator::Like
                | Operator::NotLike
                | Operator::StartingWith
                | Operator::EndingWith
                | Operator::Containing
        )
    }
}

/// Operator keywords matched against the tail of a predicate part, longest first.
const OPERATORS: &[(&[&str], Operator)] = &[
    (&["Is", "Not", "Null"], Operator::IsNotNull),
    (&["Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Not", "Null"], Operator::IsNotNull),
    (&["Is", "Null"], Operator::IsNull),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Less", "Than"], Operator::LessThan),
    (&["Not", "Like"], Operator::NotLike),
    (&["Starting", "With"], Operator::StartingWith),
    (&["Starts", "With"], Operator::StartingWith),
    (&["Ending", "With"], Operator::EndingWith),
    (&["Ends", "With"], Operator::EndingWith),
    (&["Not", "In"], Operator::NotIn),
    (&["Is", "Not"], Operator::NotEquals),
    (&["Null"], Operator::IsNull),
    (&["Between"], Operator::Between),
    (&["Like"], Operator::Like),
    (&["Containing"], Operator::Containing),
    (&["Contains"], Operator::Containing),
    (&["In"], Operator::In),
    (&["True"], Operator::True),
    (&["False"], Operator::False),
    (&["Not"], Operator::NotEquals),
    (&["Equals"], Operator::Equals),
    (&["Is"], Operator::Equals),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub path: String,
    pub operator: Operator,
    pub ignore_case: bool,
}

/// A parsed method name: action, subject modifiers, `Or`-of-`And` criteria and static ordering.
#[derive(Debug, Clone)]
pub struct DerivedQuery {
    pub method: String,
    pub action: QueryAction,
    pub distinct: bool,
    pub limit: Option<u64>,
    pub criteria: Vec<Vec<Criterion>>,
    pub sort: Sort,
}

impl DerivedQuery {
    pub fn parse(method: &str, meta: &'static EntityMeta) -> AppResult<Self> {
        let captures = method_pattern().captures(method).ok_or_else(|| {
            AppError::UnresolvedQuery {
                method: method.to_string(),
                token: method.to_string(),
                suggestion: Some("find...By...".to_string()),
            }
        })?;

        let action = match &captures[1] {
            "count" => QueryAction::Count,
            "exists" => QueryAction::Exists,
            "delete" => QueryAction::Delete,
            _ => QueryAction::Select,
        };

        let subject = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        let distinct = subject.contains("Distinct");
        let limit = match limit_pattern().captures(subject) {
            Some(top) => Some(match top.get(1).map(|m| m.as_str()).unwrap_or("") {
                "" => 1,
                digits => digits.parse::<u64>()?,
            }),
            None => None,
        };

        let body = captures.get(3).map(|m| m.as_str()).unwrap_or("");
        let words: Vec<&str> = word_pattern().find_iter(body).map(|m| m.as_str()).collect();

        let order_at = words
            .windows(2)
            .position(|pair| pair[0] == "Order" && pair[1] == "By");
        let (predicate_words, order_words) = match order_at {
            Some(index) => (&words[..index], &words[index + 2..]),
            None => (&words[..], &[][..]),
        };

        let mut criteria = Vec::new();
        if !predicate_words.is_empty() {
            for group in predicate_words.split(|w| *w == "Or") {
                let mut conjunction = Vec::new();
                for part in group.split(|w| *w == "And") {
                    conjunction.push(parse_criterion(method, meta, part)?);
                }
                criteria.push(conjunction);
            }
        }

        let sort = parse_order(method, meta, order_words)?;

        Ok(Self {
            method: method.to_string(),
            action,
            distinct,
            limit,
            criteria,
            sort,
        })
    }

    /// Number of arguments a call must supply.
    pub fn arity(&self) -> usize {
        self.criteria
            .iter()
            .flatten()
            .map(|c| c.operator.arity())
            .sum()
    }

    /// Combine call arguments with the parsed criteria.
    pub fn bind(&self, args: &[Value]) -> AppResult<Predicate> {
        if args.len() != self.arity() {
            return Err(AppError::ParameterBinding(format!(
                "`{}` expects {} argument(s), got {}",
                self.method,
                self.arity(),
                args.len()
            )));
        }

        let mut args = args.iter().cloned();
        let mut predicate = Predicate::Always;
        for group in &self.criteria {
            let mut conjunction = Predicate::Always;
            for criterion in group {
                let part = criterion_predicate(&self.method, criterion, &mut args)?;
                conjunction = conjunction.and(part);
            }
            predicate = if predicate.is_always() {
                conjunction
            } else {
                predicate.or(conjunction)
            };
        }
        Ok(predicate)
    }
}

fn lower_camel(words: &[&str]) -> String {
    let joined: String = words.concat();
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn snake(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Map property words to an attribute path, following one reference when needed
/// (`Team Name` resolves to `team.name` when `Member` has no `team_name`).
fn resolve_property(
    method: &str,
    meta: &'static EntityMeta,
    words: &[&str],
) -> AppResult<(String, &'static Attribute)> {
    if words.is_empty() {
        return Err(meta.unresolved(method, ""));
    }

    let name = snake(words);
    if let Some(attribute) = meta.attribute(&name) {
        return Ok((name, attribute));
    }

    for split in 1..words.len() {
        let head = snake(&words[..split]);
        let Some(target) = meta.attribute(&head).and_then(|a| a.target()) else {
            continue;
        };
        let tail = snake(&words[split..]);
        if let Some(attribute) = target.attribute(&tail) {
            return Ok((format!("{}.{}", head, tail), attribute));
        }
    }

    Err(meta.unresolved(method, &lower_camel(words)))
}

fn parse_criterion(
    method: &str,
    meta: &'static EntityMeta,
    words: &[&str],
) -> AppResult<Criterion> {
    let mut words = words;
    let mut ignore_case = false;
    if let Some(rest) = words
        .strip_suffix(&["Ignore", "Case"])
        .or_else(|| words.strip_suffix(&["Ignoring", "Case"]))
    {
        words = rest;
        ignore_case = true;
    }

    let mut operator = Operator::Equals;
    for (keywords, candidate) in OPERATORS {
        if words.len() > keywords.len() && words.ends_with(keywords) {
            words = &words[..words.len() - keywords.len()];
            operator = *candidate;
            break;
        }
    }
    if words.len() > 1 && words.last() == Some(&"Is") {
        words = &words[..words.len() - 1];
    }

    let (path, attribute) = resolve_property(method, meta, words)?;

    if operator.needs_text() && !matches!(attribute.kind, AttributeKind::Text) {
        return Err(AppError::ParameterBinding(format!(
            "`{}`: {:?} needs a text attribute but `{}` is {}",
            method,
            operator,
            path,
            attribute.kind.name()
        )));
    }
    if matches!(operator, Operator::True | Operator::False)
        && !matches!(attribute.kind, AttributeKind::Boolean)
    {
        return Err(AppError::ParameterBinding(format!(
            "`{}`: {:?} needs a boolean attribute but `{}` is {}",
            method,
            operator,
            path,
            attribute.kind.name()
        )));
    }
    if ignore_case && !matches!(attribute.kind, AttributeKind::Text) {
        return Err(AppError::ParameterBinding(format!(
            "`{}`: IgnoreCase needs a text attribute but `{}` is {}",
            method,
            path,
            attribute.kind.name()
        )));
    }

    Ok(Criterion {
        path,
        operator,
        ignore_case,
    })
}

fn parse_order(method: &str, meta: &'static EntityMeta, words: &[&str]) -> AppResult<Sort> {
    let mut sort = Sort::unsorted();
    let mut pending: Vec<&str> = Vec::new();

    for word in words {
        let direction = match *word {
            "Asc" => Direction::Asc,
            "Desc" => Direction::Desc,
            other => {
                pending.push(other);
                continue;
            }
        };
        let (path, _) = resolve_property(method, meta, &pending)?;
        sort = sort.and(Order {
            property: path,
            direction,
        });
        pending.clear();
    }

    if !pending.is_empty() {
        let (path, _) = resolve_property(method, meta, &pending)?;
        sort = sort.and(Order::asc(&path));
    }

    Ok(sort)
}

fn like_argument(method: &str, path: &str, value: Value, pattern: impl Fn(&str) -> String) -> AppResult<Value> {
    match value {
        Value::Text(text) => Ok(Value::Text(pattern(&text))),
        other => Err(AppError::ParameterBinding(format!(
            "`{}` expects a text argument for `{}`, got {} {}",
            method,
            path,
            other.kind_name(),
            other
        ))),
    }
}

fn criterion_predicate(
    method: &str,
    criterion: &Criterion,
    args: &mut impl Iterator<Item = Value>,
) -> AppResult<Predicate> {
    let path = criterion.path.clone();
    let mut next = || {
        args.next().ok_or_else(|| {
            AppError::ParameterBinding(format!("`{}` ran out of arguments", method))
        })
    };

    let compare = |op: Comparison, value: Value| Predicate::Compare {
        path: criterion.path.clone(),
        op,
        value,
        ignore_case: criterion.ignore_case,
    };

    let predicate = match criterion.operator {
        Operator::Equals => compare(Comparison::Eq, next()?),
        Operator::NotEquals => compare(Comparison::Ne, next()?),
        Operator::GreaterThan => compare(Comparison::Gt, next()?),
        Operator::GreaterThanEqual => compare(Comparison::Ge, next()?),
        Operator::LessThan => compare(Comparison::Lt, next()?),
        Operator::LessThanEqual => compare(Comparison::Le, next()?),
        Operator::Like => compare(Comparison::Like, next()?),
        Operator::NotLike => compare(Comparison::NotLike, next()?),
        Operator::StartingWith => compare(
            Comparison::Like,
            like_argument(method, &path, next()?, |v| format!("{}%", v))?,
        ),
        Operator::EndingWith => compare(
            Comparison::Like,
            like_argument(method, &path, next()?, |v| format!("%{}", v))?,
        ),
        Operator::Containing => compare(
            Comparison::Like,
            like_argument(method, &path, next()?, |v| format!("%{}%", v))?,
        ),
        Operator::In => compare(Comparison::In, next()?),
        Operator::NotIn => compare(Comparison::NotIn, next()?),
        Operator::Between => {
            let low = next()?;
            let high = next()?;
            Predicate::Between { path, low, high }
        }
        Operator::IsNull => Predicate::Null {
            path,
            negated: false,
        },
        Operator::IsNotNull => Predicate::Null {
            path,
            negated: true,
        },
        Operator::True => compare(Comparison::Eq, Value::Bool(true)),
        Operator::False => compare(Comparison::Eq, Value::Bool(false)),
    };
    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;
    use crate::shared::domain::Entity;

    fn parse(method: &str) -> AppResult<DerivedQuery> {
        DerivedQuery::parse(method, Member::meta())
    }

    #[test]
    fn conjunction_with_comparison() {
        let query = parse("findByUsernameAndAgeGreaterThan").unwrap();
        assert_eq!(query.action, QueryAction::Select);
        assert_eq!(query.arity(), 2);
        assert_eq!(
            query.criteria,
            vec![vec![
                Criterion {
                    path: "username".to_string(),
                    operator: Operator::Equals,
                    ignore_case: false,
                },
                Criterion {
                    path: "age".to_string(),
                    operator: Operator::GreaterThan,
                    ignore_case: false,
                },
            ]]
        );
    }

    #[test]
    fn subject_modifiers() {
        let top = parse("findTop3By").unwrap();
        assert_eq!(top.limit, Some(3));
        assert!(top.criteria.is_empty());

        let first = parse("findFirstByOrderByAgeDesc").unwrap();
        assert_eq!(first.limit, Some(1));
        assert_eq!(first.sort, Sort::desc("age"));

        assert!(parse("findDistinctByUsername").unwrap().distinct);
        assert_eq!(parse("countByAge").unwrap().action, QueryAction::Count);
        assert_eq!(parse("existsByUsername").unwrap().action, QueryAction::Exists);
        assert_eq!(parse("deleteByUsername").unwrap().action, QueryAction::Delete);
    }

    #[test]
    fn free_text_subjects_are_ignored() {
        let query = parse("findOptionalByUsername").unwrap();
        assert_eq!(query.limit, None);
        assert_eq!(query.arity(), 1);
        assert_eq!(parse("findMemberListByUsername").unwrap().arity(), 1);
    }

    #[test]
    fn nested_properties_resolve_through_references() {
        let query = parse("findByTeamNameIgnoreCaseOrAgeBetween").unwrap();
        assert_eq!(query.criteria.len(), 2);
        assert_eq!(query.criteria[0][0].path, "team.name");
        assert!(query.criteria[0][0].ignore_case);
        assert_eq!(query.criteria[1][0].operator, Operator::Between);
        assert_eq!(query.arity(), 3);
    }

    #[test]
    fn unknown_tokens_fail_with_a_suggestion() {
        match parse("findByUsernmeAndAge").unwrap_err() {
            AppError::UnresolvedQuery {
                method,
                token,
                suggestion,
            } => {
                assert_eq!(method, "findByUsernmeAndAge");
                assert_eq!(token, "usernme");
                assert_eq!(suggestion.as_deref(), Some("username"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse("fetchByUsername").is_err());
        assert!(parse("findByUsernameOrderByNickname").is_err());
    }

    #[test]
    fn operator_kinds_are_checked_at_parse_time() {
        assert!(matches!(
            parse("findByAgeContaining").unwrap_err(),
            AppError::ParameterBinding(_)
        ));
        assert!(parse("findByUsernameStartingWith").is_ok());
    }

    #[test]
    fn binding_checks_arity_and_builds_predicates() {
        let query = parse("findByUsernameAndAgeGreaterThan").unwrap();
        assert!(matches!(
            query.bind(&[Value::from("AAA")]).unwrap_err(),
            AppError::ParameterBinding(_)
        ));

        let predicate = query
            .bind(&[Value::from("AAA"), Value::Int(5)])
            .unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![
                Predicate::compare("username", Comparison::Eq, Value::from("AAA")),
                Predicate::compare("age", Comparison::Gt, Value::Int(5)),
            ])
        );

        let starting = parse("findByUsernameStartingWith").unwrap();
        assert_eq!(
            starting.bind(&[Value::from("mem")]).unwrap(),
            Predicate::compare("username", Comparison::Like, Value::from("mem%"))
        );
    }
}
