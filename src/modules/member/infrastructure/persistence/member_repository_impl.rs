use crate::modules::member::application::projections::{MemberDto, MemberProjection, UsernameRow};
use crate::modules::member::domain::entities::Member;
use crate::modules::member::domain::repositories::MemberRepository;
use crate::shared::application::pagination::{Page, PageRequest, Slice};
use crate::shared::domain::{Args, Managed, Repository, Value};
use crate::shared::errors::{AppResult, OptionExt};
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::query::{LockMode, QueryDefinition, QueryRegistry, View};
use crate::log_info;

const FIND_BY_USERNAME: &str = "SELECT * FROM member WHERE username = :username";

/// Member repository backed by plans registered once, at construction.
pub struct MemberRepositoryImpl {
    pub(crate) queries: QueryRegistry<Member>,
}

impl MemberRepositoryImpl {
    pub fn new() -> AppResult<Self> {
        let queries = QueryRegistry::new();
        queries.register_named_query("Member.findByUsername", FIND_BY_USERNAME)?;
        queries.register_entity_graph("Member.all", &["team"])?;

        let definitions = vec![
            QueryDefinition::derived("findByUsernameAndAgeGreaterThan"),
            QueryDefinition::derived("findTop3By"),
            QueryDefinition::named("findByUserName", "Member.findByUsername"),
            QueryDefinition::explicit(
                "findUser",
                "SELECT * FROM member WHERE username = :username AND age = :age",
            ),
            QueryDefinition::explicit("findUsernameList", "SELECT username FROM member")
                .constructor::<UsernameRow>(),
            QueryDefinition::explicit(
                "findMemberDto",
                "SELECT m.member_id AS id, m.username, t.name AS team_name \
                 FROM member m JOIN team t ON m.team_id = t.team_id",
            )
            .constructor::<MemberDto>(),
            QueryDefinition::explicit("findByNames", "SELECT * FROM member WHERE username IN :names"),
            QueryDefinition::derived("findListByUsername"),
            QueryDefinition::derived("findMemberByUsername"),
            QueryDefinition::derived("findOptionalByUsername"),
            QueryDefinition::explicit(
                "findByAge",
                "SELECT m.* FROM member m LEFT JOIN team t ON m.team_id = t.team_id WHERE m.age = ?",
            )
            .count_query("SELECT COUNT(*) FROM member m WHERE m.age = ?"),
            QueryDefinition::explicit("bulkAgePlus", "UPDATE member SET age = age + 1 WHERE age >= :age")
                .modifying(true),
            QueryDefinition::explicit(
                "findMemberFetchJoin",
                "SELECT m.* FROM member m LEFT JOIN team t ON m.team_id = t.team_id",
            )
            .fetch("team"),
            QueryDefinition::derived("findAll").fetch("team"),
            QueryDefinition::explicit("findMemberEntityGraph", "SELECT * FROM member").fetch("team"),
            QueryDefinition::derived("findEntityGraphByUsername").entity_graph("Member.all"),
            QueryDefinition::derived("findReadOnlyByUsername").read_only(),
            QueryDefinition::derived("findLockByUsername").lock(LockMode::PessimisticWrite),
            QueryDefinition::derived("findProjectionsByUsername"),
            QueryDefinition::explicit("findByNativeQuery", "SELECT * FROM member m WHERE username = ?"),
            QueryDefinition::explicit(
                "findByNativeProjection",
                "SELECT m.member_id AS id, m.username, t.name AS team_name \
                 FROM member m LEFT JOIN team t ON m.team_id = t.team_id",
            )
            .count_query("SELECT COUNT(*) FROM member")
            .constructor::<MemberProjection>(),
            QueryDefinition::derived("countByAge"),
            QueryDefinition::derived("existsByUsername"),
            QueryDefinition::derived("deleteByUsername"),
        ];
        for definition in definitions {
            queries.register(definition)?;
        }

        log_info!("Member repository ready with {} query plans", queries.len());
        Ok(Self { queries })
    }
}

impl Repository<Member> for MemberRepositoryImpl {
    /// Every member with its team, loaded in one extra select.
    fn find_all(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(uow, "findAll", Args::new())
    }
}

impl MemberRepository for MemberRepositoryImpl {
    fn find_by_username_and_age_greater_than(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
        age: i32,
    ) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(
            uow,
            "findByUsernameAndAgeGreaterThan",
            Args::new().arg(username).arg(age),
        )
    }

    fn find_top3(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(uow, "findTop3By", Args::new())
    }

    fn find_by_user_name(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>> {
        self.queries
            .list(uow, "findByUserName", Args::new().bind("username", username))
    }

    fn find_user(&self, uow: &mut UnitOfWork<'_>, username: &str, age: i32) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(
            uow,
            "findUser",
            Args::new().bind("username", username).bind("age", age),
        )
    }

    fn find_username_list(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<String>> {
        let rows = self
            .queries
            .rows::<UsernameRow>(uow, "findUsernameList", Args::new())?;
        Ok(rows.into_iter().map(|row| row.username).collect())
    }

    fn find_member_dto(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<MemberDto>> {
        self.queries.rows::<MemberDto>(uow, "findMemberDto", Args::new())
    }

    fn find_by_names(&self, uow: &mut UnitOfWork<'_>, names: &[&str]) -> AppResult<Vec<Managed<Member>>> {
        self.queries
            .list(uow, "findByNames", Args::new().bind("names", Value::from(names)))
    }

    fn find_list_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>> {
        self.queries
            .list(uow, "findListByUsername", Args::new().arg(username))
    }

    fn find_member_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Managed<Member>> {
        self.queries
            .optional(uow, "findMemberByUsername", Args::new().arg(username))?
            .or_not_found(|| format!("Member with username `{}`", username))
    }

    fn find_optional_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>> {
        self.queries
            .optional(uow, "findOptionalByUsername", Args::new().arg(username))
    }

    fn find_by_age(
        &self,
        uow: &mut UnitOfWork<'_>,
        age: i32,
        request: &PageRequest,
    ) -> AppResult<Page<Managed<Member>>> {
        self.queries.page(uow, "findByAge", Args::new().arg(age), request)
    }

    fn find_slice_by_age(
        &self,
        uow: &mut UnitOfWork<'_>,
        age: i32,
        request: &PageRequest,
    ) -> AppResult<Slice<Managed<Member>>> {
        self.queries.slice(uow, "findByAge", Args::new().arg(age), request)
    }

    fn bulk_age_plus(&self, uow: &mut UnitOfWork<'_>, age: i32) -> AppResult<usize> {
        self.queries
            .modify(uow, "bulkAgePlus", Args::new().bind("age", age))
    }

    fn find_member_fetch_join(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(uow, "findMemberFetchJoin", Args::new())
    }

    fn find_member_entity_graph(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>> {
        self.queries.list(uow, "findMemberEntityGraph", Args::new())
    }

    fn find_entity_graph_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Vec<Managed<Member>>> {
        self.queries
            .list(uow, "findEntityGraphByUsername", Args::new().arg(username))
    }

    fn find_read_only_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>> {
        self.queries
            .optional(uow, "findReadOnlyByUsername", Args::new().arg(username))
    }

    fn find_lock_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>> {
        self.queries
            .list(uow, "findLockByUsername", Args::new().arg(username))
    }

    fn find_projections_by_username<V: View>(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<V>> {
        self.queries
            .views::<V>(uow, "findProjectionsByUsername", Args::new().arg(username))
    }

    fn find_by_native_query(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>> {
        self.queries
            .optional(uow, "findByNativeQuery", Args::new().arg(username))
    }

    fn find_by_native_projection(
        &self,
        uow: &mut UnitOfWork<'_>,
        request: &PageRequest,
    ) -> AppResult<Page<MemberProjection>> {
        self.queries
            .rows_page::<MemberProjection>(uow, "findByNativeProjection", Args::new(), request)
    }

    fn count_by_age(&self, uow: &mut UnitOfWork<'_>, age: i32) -> AppResult<u64> {
        self.queries.count(uow, "countByAge", Args::new().arg(age))
    }

    fn exists_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<bool> {
        self.queries
            .exists(uow, "existsByUsername", Args::new().arg(username))
    }

    fn delete_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<usize> {
        self.queries
            .delete(uow, "deleteByUsername", Args::new().arg(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::errors::AppError;
    use crate::shared::query::NestedSource;
    use crate::modules::member::application::projections::NestedClosedProjection;

    #[test]
    fn every_query_resolves_at_construction() {
        let repository = MemberRepositoryImpl::new().unwrap();
        assert_eq!(repository.queries.len(), 24);

        let graph = repository.queries.plan("findEntityGraphByUsername").unwrap();
        assert!(graph.hints.fetches("team"));

        let bulk = repository.queries.plan("bulkAgePlus").unwrap();
        assert!(bulk.modifying);
        assert!(bulk.hints.clear_automatically);
    }

    #[test]
    fn unknown_methods_suggest_a_registered_one() {
        let repository = MemberRepositoryImpl::new().unwrap();
        let err = repository.queries.plan("findByUsernameAndAgeGreaterThen").unwrap_err();
        match err {
            AppError::UnresolvedQuery { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("findByUsernameAndAgeGreaterThan"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nested_projection_without_fetch_is_flagged() {
        let repository = MemberRepositoryImpl::new().unwrap();
        let view_plan = repository
            .queries
            .view_plan::<NestedClosedProjection>("findProjectionsByUsername")
            .unwrap();
        assert_eq!(view_plan.source_of("team"), Some(NestedSource::PerRow));
        assert_eq!(view_plan.hazards().len(), 1);
    }
}
