/// Test data factories
///
/// Plain constructors for the members and teams most tests start from.
use roster::modules::member::{Member, MemberRepositoryImpl};
use roster::modules::team::{Team, TeamRepositoryImpl};
use roster::shared::domain::{Managed, Repository};
use roster::shared::UnitOfWork;

pub fn member_repository() -> MemberRepositoryImpl {
    MemberRepositoryImpl::new().expect("member queries must resolve")
}

pub fn team_repository() -> TeamRepositoryImpl {
    TeamRepositoryImpl::new().expect("team queries must resolve")
}

/// Saves `member1`..`member{count}`, all aged `age`.
pub fn numbered_members(
    uow: &mut UnitOfWork<'_>,
    repository: &MemberRepositoryImpl,
    count: usize,
    age: i32,
) -> Vec<Managed<Member>> {
    (1..=count)
        .map(|i| {
            repository
                .save(uow, Member::new(&format!("member{}", i), age))
                .expect("save member")
        })
        .collect()
}

/// `teamA` with members `m1` and `m2`, both aged 0.
pub fn team_with_two_members(
    uow: &mut UnitOfWork<'_>,
    members: &MemberRepositoryImpl,
    teams: &TeamRepositoryImpl,
) -> Managed<Team> {
    let team = teams.save(uow, Team::new("teamA")).expect("save team");
    members
        .save(uow, Member::with_team("m1", 0, &team))
        .expect("save m1");
    members
        .save(uow, Member::with_team("m2", 0, &team))
        .expect("save m2");
    team
}
