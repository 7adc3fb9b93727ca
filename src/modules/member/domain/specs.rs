/// Reusable member filters
use crate::modules::member::domain::entities::Member;
use crate::shared::query::Specification;

/// Members of the team called `name`. An empty name leaves the filter open.
pub fn team_name(name: &str) -> Specification<Member> {
    Specification::equal("team.name", name)
}

pub fn username(name: &str) -> Specification<Member> {
    Specification::equal("username", name)
}

pub fn older_than(age: i32) -> Specification<Member> {
    Specification::greater_than("age", age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::query::predicate::Predicate;

    #[test]
    fn empty_team_name_matches_everyone() {
        assert!(team_name("").is_unrestricted());
        assert_eq!(team_name("").and(username("m1")).predicate(), username("m1").predicate());
    }

    #[test]
    fn composed_filters_keep_both_sides() {
        let spec = username("m1").and(team_name("teamA"));
        assert!(matches!(spec.predicate(), Predicate::And(parts) if parts.len() == 2));
    }
}
