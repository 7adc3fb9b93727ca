/// Unit of work tests - identity, dirty checking, transactions and concurrency
mod utils;

use std::sync::Arc;

use futures::future::join_all;
use roster::modules::member::{Member, MemberId, MemberRepository};
use roster::modules::team::{Team, TeamId};
use roster::shared::domain::{Entity, Repository};
use roster::shared::errors::AppError;
use utils::{db, factories};

#[test]
fn one_handle_per_identifier() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            let saved = repository.save(uow, Member::new("member1", 10))?;
            let by_id = repository.find_by_id(uow, saved.id())?.unwrap();
            let by_query = repository.find_member_by_username(uow, "member1")?;

            assert!(by_id.ptr_eq(&saved));
            assert!(by_query.ptr_eq(&saved));
            assert_eq!(uow.managed_count(), 1);
            Ok(())
        })
        .unwrap();
}

#[test]
fn dirty_entities_are_flushed_at_commit() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    let id = database
        .unit_of_work(|uow| {
            let member = repository.save(uow, Member::new("member1", 10))?;
            member.borrow_mut().age = 11;
            Ok(member.id())
        })
        .unwrap();

    database
        .unit_of_work(|uow| {
            let member = repository.get_by_id(uow, id)?;
            assert_eq!(member.borrow().age, 11);
            Ok(())
        })
        .unwrap();
}

#[test]
fn queries_see_unflushed_changes() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            let member = repository.save(uow, Member::new("member1", 10))?;
            member.borrow_mut().username = "renamed".to_string();

            assert!(repository.find_optional_by_username(uow, "member1")?.is_none());
            let renamed = repository.find_optional_by_username(uow, "renamed")?.unwrap();
            assert!(renamed.ptr_eq(&member));
            assert_eq!(uow.stats().flushed, 1);
            Ok(())
        })
        .unwrap();
}

#[test]
fn failed_work_rolls_back() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    let result: Result<(), AppError> = database.unit_of_work(|uow| {
        repository.save(uow, Member::new("member1", 10))?;
        Err(AppError::InvalidInput("abort".to_string()))
    });
    assert!(result.is_err());

    database
        .unit_of_work(|uow| {
            assert_eq!(repository.count(uow)?, 0);
            Ok(())
        })
        .unwrap();
}

#[test]
fn invalid_entities_are_rejected_before_any_statement() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            let err = repository.save(uow, Member::new("member1", -1)).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
            assert_eq!(uow.stats().statements, 0);
            Ok(())
        })
        .unwrap();
}

#[test]
fn save_merges_detached_copies_and_upserts_unknown_ids() {
    let database = db::in_memory();
    let teams = factories::team_repository();

    database
        .unit_of_work(|uow| {
            let team = teams.save(uow, Team::new("teamA"))?;
            let mut copy = team.get();
            copy.name = "teamB".to_string();

            let merged = teams.save(uow, copy)?;
            assert!(merged.ptr_eq(&team));
            assert_eq!(team.borrow().name, "teamB");

            let upserted = teams.save(uow, Team::persisted(TeamId(42), "teamC"))?;
            assert_eq!(upserted.id(), TeamId(42));
            assert_eq!(teams.count(uow)?, 2);
            Ok(())
        })
        .unwrap();
}

#[test]
fn dangling_foreign_key_is_not_found_on_fetch() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            // checked at commit instead of per statement
            uow.execute_sql("PRAGMA defer_foreign_keys = ON")?;
            let member = repository.save(uow, Member::with_team_id("member1", 10, TeamId(99)))?;
            let err = uow.fetch(&member, Member::team_mut).unwrap_err();
            assert!(err.is_not_found());
            repository.delete(uow, &member)?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn foreign_keys_are_enforced() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    let result = database.unit_of_work(|uow| {
        repository.save(uow, Member::with_team_id("member1", 10, TeamId(99)))?;
        Ok(())
    });
    assert!(result.unwrap_err().is_constraint_violation());
}

#[test]
fn delete_all_empties_the_table() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            let members = factories::numbered_members(uow, &repository, 4, 10);
            assert_eq!(repository.delete_all(uow)?, 4);
            assert_eq!(repository.count(uow)?, 0);
            assert!(!uow.contains::<Member>(members[0].id()));
            Ok(())
        })
        .unwrap();
}

#[test]
fn clear_drops_pending_changes() {
    let database = db::in_memory();
    let repository = factories::member_repository();

    database
        .unit_of_work(|uow| {
            let member = repository.save(uow, Member::new("member1", 10))?;
            member.borrow_mut().age = 50;
            uow.clear();
            let reloaded = repository.get_by_id(uow, member.id())?;
            assert_eq!(reloaded.borrow().age, 10);
            assert_eq!(reloaded.borrow().id(), Some(member.id()));
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn concurrent_units_of_work_each_commit() {
    let file = db::FileDb::new(4);
    let repository = Arc::new(factories::member_repository());

    let tasks = (0..8).map(|i| {
        let repository = Arc::clone(&repository);
        file.database.run(move |db| {
            db.locking_unit_of_work(|uow| {
                let member = repository.save(uow, Member::new(&format!("member{}", i), i))?;
                Ok(member.id())
            })
        })
    });
    let ids: Vec<MemberId> = join_all(tasks)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids.len(), 8);

    let total = file
        .database
        .run({
            let repository = Arc::clone(&repository);
            move |db| db.unit_of_work(|uow| repository.count(uow))
        })
        .await
        .unwrap();
    assert_eq!(total, 8);
}
