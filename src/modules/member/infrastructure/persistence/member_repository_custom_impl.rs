use super::member_repository_impl::MemberRepositoryImpl;
use crate::modules::member::domain::entities::Member;
use crate::modules::member::domain::repositories::MemberRepositoryCustom;
use crate::shared::domain::{Args, Managed};
use crate::shared::errors::AppResult;
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::query::native_query;

impl MemberRepositoryCustom for MemberRepositoryImpl {
    fn find_member_custom(&self, uow: &mut UnitOfWork<'_>) -> AppResult<Vec<Managed<Member>>> {
        native_query::<Member>(
            uow,
            "findMemberCustom",
            "SELECT * FROM member ORDER BY member_id",
            &Args::new(),
        )
    }
}
