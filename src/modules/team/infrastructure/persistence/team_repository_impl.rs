use crate::modules::member::domain::entities::Member;
use crate::modules::team::domain::entities::Team;
use crate::modules::team::domain::repositories::TeamRepository;
use crate::shared::application::pagination::Sort;
use crate::shared::domain::{Args, Managed, Repository};
use crate::shared::errors::AppResult;
use crate::shared::infrastructure::unit_of_work::UnitOfWork;
use crate::shared::query::{find_matching, QueryDefinition, QueryRegistry, Specification, Window};

pub struct TeamRepositoryImpl {
    queries: QueryRegistry<Team>,
}

impl TeamRepositoryImpl {
    pub fn new() -> AppResult<Self> {
        let queries = QueryRegistry::new();
        queries.register(QueryDefinition::derived("findByName"))?;
        Ok(Self { queries })
    }
}

impl Repository<Team> for TeamRepositoryImpl {}

impl TeamRepository for TeamRepositoryImpl {
    fn find_by_name(&self, uow: &mut UnitOfWork<'_>, name: &str) -> AppResult<Option<Managed<Team>>> {
        self.queries.optional(uow, "findByName", Args::new().arg(name))
    }

    fn members_of(&self, uow: &mut UnitOfWork<'_>, team: &Managed<Team>) -> AppResult<Vec<Managed<Member>>> {
        find_matching(
            uow,
            &Specification::<Member>::equal("team", team.id()),
            &Sort::asc("id"),
            Window::default(),
        )
    }
}
