/// Query by example: a probe entity whose set attributes become equality filters
use crate::shared::domain::{Entity, EntityId, Value};

use super::predicate::{Comparison, Predicate};
use super::specification::Specification;

/// Every non-null attribute of the probe is compared for equality, empty
/// strings included; zero-valued numbers must be ignored explicitly.
///
/// ```ignore
/// let example = Example::of(Member::new("m1", 0))
///     .ignoring("age")
///     .matching("team.name", "teamA");
/// repository.find_all_by_example(uow, &example)?;
/// ```
#[derive(Debug, Clone)]
pub struct Example<E: Entity> {
    probe: E,
    ignored: Vec<String>,
    related: Vec<(String, Value)>,
}

impl<E: Entity> Example<E> {
    pub fn of(probe: E) -> Self {
        Self {
            probe,
            ignored: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn ignoring(mut self, path: &str) -> Self {
        self.ignored.push(path.to_string());
        self
    }

    /// Add an equality on a related entity's attribute, e.g. `team.name`.
    pub fn matching(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.related.push((path.to_string(), value.into()));
        self
    }

    pub fn probe(&self) -> &E {
        &self.probe
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignored.iter().any(|p| p == path)
    }

    pub fn to_specification(&self) -> Specification<E> {
        let meta = E::meta();
        let mut predicate = Predicate::Always;

        if let Some(id) = self.probe.id() {
            if let Some(attribute) = meta.attributes.first() {
                if !self.is_ignored(attribute.name) {
                    predicate =
                        predicate.and(Predicate::compare(attribute.name, Comparison::Eq, Value::Int(id.raw())));
                }
            }
        }

        for (attribute, value) in meta.data_attributes().zip(self.probe.column_values()) {
            if value.is_null() || self.is_ignored(attribute.name) {
                continue;
            }
            predicate = predicate.and(Predicate::compare(attribute.name, Comparison::Eq, value));
        }

        for (path, value) in &self.related {
            if self.is_ignored(path) {
                continue;
            }
            let compared = match value {
                Value::Null => Predicate::Null {
                    path: path.clone(),
                    negated: false,
                },
                other => Predicate::compare(path, Comparison::Eq, other.clone()),
            };
            predicate = predicate.and(compared);
        }

        Specification::from_predicate(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;

    #[test]
    fn set_attributes_become_filters() {
        let example = Example::of(Member::new("m1", 0)).ignoring("age");
        match example.to_specification().predicate() {
            Predicate::Compare { path, value, .. } => {
                assert_eq!(path, "username");
                assert_eq!(value, &Value::from("m1"));
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn empty_strings_are_still_compared() {
        let example = Example::of(Member::new("", 0))
            .ignoring("age")
            .matching("team.name", "teamA");
        match example.to_specification().predicate() {
            Predicate::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected predicate: {other:?}"),
        }
    }
}
