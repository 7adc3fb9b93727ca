/// Composable, typed filters over one entity type
use std::fmt;
use std::marker::PhantomData;

use crate::shared::domain::{Entity, Value};

use super::predicate::{Comparison, Predicate};

/// An immutable predicate over `E`.
///
/// A leaf built from a null or empty-string argument is the no-op
/// specification: it matches every row instead of narrowing to empty values.
/// Composition drops no-op operands, so `all().and(x)` and `all().or(x)` are
/// both `x`, and `not(all())` is still `all()`.
pub struct Specification<E> {
    predicate: Predicate,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Specification<E> {
    fn wrap(predicate: Predicate) -> Self {
        Self {
            predicate,
            _entity: PhantomData,
        }
    }

    fn leaf(path: &str, op: Comparison, value: Value) -> Self {
        if is_absent(&value) {
            return Self::all();
        }
        Self::wrap(Predicate::compare(path, op, value))
    }

    /// The unrestricted specification.
    pub fn all() -> Self {
        Self::wrap(Predicate::Always)
    }

    pub fn equal(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Eq, value.into())
    }

    pub fn not_equal(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Ne, value.into())
    }

    pub fn greater_than(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Gt, value.into())
    }

    pub fn greater_than_or_equal(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Ge, value.into())
    }

    pub fn less_than(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Lt, value.into())
    }

    pub fn less_than_or_equal(path: &str, value: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Le, value.into())
    }

    pub fn like(path: &str, pattern: impl Into<Value>) -> Self {
        Self::leaf(path, Comparison::Like, pattern.into())
    }

    /// Membership in `values`. An empty set matches nothing.
    pub fn is_in<V: Into<Value>>(path: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        Self::wrap(Predicate::compare(path, Comparison::In, Value::List(values)))
    }

    pub fn is_null(path: &str) -> Self {
        Self::wrap(Predicate::Null {
            path: path.to_string(),
            negated: false,
        })
    }

    pub fn and(self, other: Specification<E>) -> Self {
        Self::wrap(self.predicate.and(other.predicate))
    }

    pub fn or(self, other: Specification<E>) -> Self {
        Self::wrap(self.predicate.or(other.predicate))
    }

    pub fn not(self) -> Self {
        Self::wrap(self.predicate.negate())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.predicate.is_always()
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Build from a raw predicate, for filters assembled outside the leaf helpers.
    pub fn from_predicate(predicate: Predicate) -> Self {
        Self::wrap(predicate)
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(text) => text.is_empty(),
        _ => false,
    }
}

impl<E> Clone for Specification<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Specification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Specification").field(&self.predicate).finish()
    }
}

impl<E: Entity> Default for Specification<E> {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;

    #[test]
    fn empty_and_null_arguments_are_no_ops() {
        assert!(Specification::<Member>::equal("team.name", "").is_unrestricted());
        assert!(Specification::<Member>::equal("username", None::<String>).is_unrestricted());
        assert!(!Specification::<Member>::equal("username", "member1").is_unrestricted());
    }

    #[test]
    fn composition_drops_no_op_operands() {
        let username = Specification::<Member>::equal("username", "member1");
        let noop = Specification::<Member>::equal("team.name", "");

        assert_eq!(
            noop.clone().and(username.clone()).predicate(),
            username.predicate()
        );
        assert_eq!(noop.clone().or(username.clone()).predicate(), username.predicate());
        assert!(noop.not().is_unrestricted());
    }

    #[test]
    fn empty_in_set_is_not_a_no_op() {
        let spec = Specification::<Member>::is_in("username", Vec::<String>::new());
        assert!(!spec.is_unrestricted());
    }
}
