use super::application::projections::MemberDto;
use super::domain::entities::{Member, MemberId};
use super::domain::repositories::MemberRepository;
use crate::shared::application::pagination::{Page, PageRequest, Sort};
use crate::shared::config::PagingConfig;
use crate::shared::errors::OptionExt;
use crate::shared::infrastructure::Database;

use crate::{log_debug, log_error, log_info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Page size of `list_members` when the caller gives none.
pub const LIST_DEFAULT_SIZE: u32 = 5;
const LIST_DEFAULT_SORT: &str = "username";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMemberRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListMembersRequest {
    pub page: Option<u32>,
    pub size: Option<u32>,
    /// `property[,asc|desc]` entries, applied in order
    #[serde(default)]
    pub sort: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMembersRequest {
    pub count: u32,
}

/// Username of the member with the given identifier.
pub async fn find_member<R>(
    request: FindMemberRequest,
    database: &Database,
    repository: Arc<R>,
) -> Result<String, String>
where
    R: MemberRepository + 'static,
{
    database
        .run(move |db| {
            db.unit_of_work(|uow| {
                let member = repository
                    .find_by_id(uow, MemberId(request.id))?
                    .or_not_found(|| format!("Member {}", request.id))?;
                let username = member.borrow().username.clone();
                Ok(username)
            })
        })
        .await
        .map_err(|e| e.to_string())
}

pub async fn list_members<R>(
    request: ListMembersRequest,
    database: &Database,
    repository: Arc<R>,
    paging: PagingConfig,
) -> Result<Page<MemberDto>, String>
where
    R: MemberRepository + 'static,
{
    let size = PagingConfig {
        default_size: LIST_DEFAULT_SIZE,
        ..paging
    }
    .effective_size(request.size);

    let sort = if request.sort.is_empty() {
        Sort::asc(LIST_DEFAULT_SORT)
    } else {
        let params: Vec<&str> = request.sort.iter().map(String::as_str).collect();
        Sort::parse(&params).map_err(|e| e.to_string())?
    };
    let page_request =
        PageRequest::sorted(request.page.unwrap_or(0), size, sort).map_err(|e| e.to_string())?;
    log_debug!(
        "list_members command called - page: {}, size: {}",
        page_request.number(),
        page_request.size()
    );

    database
        .run(move |db| {
            db.unit_of_work(|uow| {
                let page = repository.find_page(uow, &page_request)?;
                Ok(page.map(|member| MemberDto::of(&member)))
            })
        })
        .await
        .map_err(|e| e.to_string())
}

/// Insert `user0`..`user{count-1}` with ages matching their index.
pub async fn seed_members<R>(
    request: SeedMembersRequest,
    database: &Database,
    repository: Arc<R>,
) -> Result<u32, String>
where
    R: MemberRepository + 'static,
{
    let count = request.count;
    let result = database
        .run(move |db| {
            db.unit_of_work(|uow| {
                let members = (0..count)
                    .map(|i| Member::new(&format!("user{}", i), i as i32))
                    .collect();
                repository.save_all(uow, members)?;
                Ok(count)
            })
        })
        .await
        .map_err(|e| e.to_string());

    match &result {
        Ok(seeded) => log_info!("Seeded {} members", seeded),
        Err(e) => log_error!("Failed to seed members: {}", e),
    }

    result
}
