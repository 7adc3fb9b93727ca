use crate::modules::member::application::projections::{MemberDto, MemberProjection};
use crate::modules::member::domain::entities::Member;
use crate::shared::application::pagination::{Page, PageRequest, Slice};
use crate::shared::domain::{Managed, Repository};
use crate::shared::errors::AppResult;
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::query::View;

/// Hand-written member queries mixed into `MemberRepository`.
pub trait MemberRepositoryCustom {
    fn find_member_custom(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>>;
}

pub trait MemberRepository: Repository<Member> + MemberRepositoryCustom {
    fn find_by_username_and_age_greater_than(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
        age: i32,
    ) -> AppResult<Vec<Managed<Member>>>;

    fn find_top3(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>>;

    /// Runs the `Member.findByUsername` named query.
    fn find_by_user_name(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>>;

    fn find_user(&self, uow: &mut UnitOfWork<'_>, username: &str, age: i32) -> AppResult<Vec<Managed<Member>>>;

    fn find_username_list(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<String>>;

    /// Members with a team, as summaries. Members without a team are skipped.
    fn find_member_dto(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<MemberDto>>;

    fn find_by_names(&self, uow: &mut UnitOfWork<'_>, names: &[&str]) -> AppResult<Vec<Managed<Member>>>;

    fn find_list_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>>;

    /// Exactly one member; `NotFound` when there is none.
    fn find_member_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Managed<Member>>;

    fn find_optional_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>>;

    fn find_by_age(
        &self,
        uow: &mut UnitOfWork<'_>,
        age: i32,
        request: &PageRequest,
    ) -> AppResult<Page<Managed<Member>>>;

    fn find_slice_by_age(
        &self,
        uow: &mut UnitOfWork<'_>,
        age: i32,
        request: &PageRequest,
    ) -> AppResult<Slice<Managed<Member>>>;

    /// Adds one year to every member at least `age` old. Managed members are
    /// evicted afterwards, so later lookups see the new ages.
    fn bulk_age_plus(&self, uow: &mut UnitOfWork<'_>, age: i32) -> AppResult<usize>;

    fn find_member_fetch_join(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>>;

    fn find_member_entity_graph(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>>;

    fn find_entity_graph_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Vec<Managed<Member>>>;

    /// Loaded read-only: changes to the result are never flushed.
    fn find_read_only_by_username(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>>;

    fn find_lock_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<Managed<Member>>>;

    fn find_projections_by_username<V: View>(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<Vec<V>>
    where
        Self: Sized;

    fn find_by_native_query(
        &self,
        uow: &mut UnitOfWork<'_>,
        username: &str,
    ) -> AppResult<Option<Managed<Member>>>;

    fn find_by_native_projection(
        &self,
        uow: &mut UnitOfWork<'_>,
        request: &PageRequest,
    ) -> AppResult<Page<MemberProjection>>;

    fn count_by_age(&self, uow: &mut UnitOfWork<'_>, age: i32) -> AppResult<u64>;

    fn exists_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<bool>;

    fn delete_by_username(&self, uow: &mut UnitOfWork<'_>, username: &str) -> AppResult<usize>;
}
