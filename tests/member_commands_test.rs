/// Member command tests - the async handlers over the blocking store
mod utils;

use std::sync::Arc;

use roster::modules::member::commands::{
    find_member, list_members, seed_members, FindMemberRequest, ListMembersRequest, SeedMembersRequest,
    LIST_DEFAULT_SIZE,
};
use roster::shared::config::PagingConfig;
use utils::{db, factories};

fn paging() -> PagingConfig {
    PagingConfig {
        default_size: 20,
        max_size: 50,
    }
}

#[tokio::test]
async fn seeded_members_are_listed_by_username() {
    let database = db::in_memory();
    let repository = Arc::new(factories::member_repository());

    let seeded = seed_members(SeedMembersRequest { count: 12 }, &database, Arc::clone(&repository))
        .await
        .unwrap();
    assert_eq!(seeded, 12);

    let page = list_members(ListMembersRequest::default(), &database, Arc::clone(&repository), paging())
        .await
        .unwrap();
    assert_eq!(page.size, LIST_DEFAULT_SIZE);
    assert_eq!(page.total_elements, 12);
    assert_eq!(page.total_pages, 3);
    let names: Vec<&str> = page.content.iter().map(|dto| dto.username.as_str()).collect();
    assert_eq!(names, vec!["user0", "user1", "user10", "user11", "user2"]);
    assert!(page.content.iter().all(|dto| dto.team_name.is_none()));
}

#[tokio::test]
async fn list_honours_sort_and_clamps_size() {
    let database = db::in_memory();
    let repository = Arc::new(factories::member_repository());
    seed_members(SeedMembersRequest { count: 60 }, &database, Arc::clone(&repository))
        .await
        .unwrap();

    let request = ListMembersRequest {
        page: Some(0),
        size: Some(500),
        sort: vec!["age,desc".to_string()],
    };
    let page = list_members(request, &database, Arc::clone(&repository), paging())
        .await
        .unwrap();
    assert_eq!(page.size, 50);
    assert_eq!(page.content.len(), 50);
    assert_eq!(page.content[0].username, "user59");
    assert!(page.has_next);
}

#[tokio::test]
async fn unknown_sort_property_is_reported() {
    let database = db::in_memory();
    let repository = Arc::new(factories::member_repository());

    let request = ListMembersRequest {
        sort: vec!["nickname".to_string()],
        ..ListMembersRequest::default()
    };
    let err = list_members(request, &database, repository, paging())
        .await
        .unwrap_err();
    assert!(err.contains("nickname"));
}

#[tokio::test]
async fn find_member_returns_the_username() {
    let database = db::in_memory();
    let repository = Arc::new(factories::member_repository());
    seed_members(SeedMembersRequest { count: 3 }, &database, Arc::clone(&repository))
        .await
        .unwrap();

    let username = find_member(FindMemberRequest { id: 1 }, &database, Arc::clone(&repository))
        .await
        .unwrap();
    assert_eq!(username, "user0");

    let missing = find_member(FindMemberRequest { id: 99 }, &database, repository)
        .await
        .unwrap_err();
    assert!(missing.contains("Not found"));
}
