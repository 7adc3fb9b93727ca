use crate::modules::member::domain::entities::Member;
use crate::modules::team::domain::entities::Team;
use crate::shared::domain::{Managed, Repository};
use crate::shared::errors::AppResult;
use crate::shared::infrastructure::unit_of_work::UnitOfWork;

pub trait TeamRepository: Repository<Team> {
    fn find_by_name(&self, uow: &mut UnitOfWork<'_>, name: &str) -> AppResult<Option<Managed<Team>>>;

    /// Inverse side of `Member::team`, recomputed from the members' foreign keys.
    fn members_of(&self, uow: &mut UnitOfWork<'_>, team: &Managed<Team>) -> AppResult<Vec<Managed<Member>>>;
}
