use std::sync::Arc;

use anyhow::Context;
use roster::modules::member::commands::{self, FindMemberRequest, ListMembersRequest, SeedMembersRequest};
use roster::modules::member::MemberRepositoryImpl;
use roster::shared::domain::Repository;
use roster::shared::utils::logger::init_logger;
use roster::shared::{AppConfig, Database};
use roster::{log_info, log_warn};

const DEMO_MEMBERS: u32 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let config = AppConfig::from_env().context("loading configuration")?;
    let database = Database::new(&config.database).context("opening the database")?;
    database.run_migrations().context("running migrations")?;

    let repository = Arc::new(MemberRepositoryImpl::new()?);

    let existing = {
        let repository = Arc::clone(&repository);
        database
            .run(move |db| db.unit_of_work(|uow| repository.count(uow)))
            .await?
    };
    if existing == 0 {
        let seeded = commands::seed_members(
            SeedMembersRequest { count: DEMO_MEMBERS },
            &database,
            Arc::clone(&repository),
        )
        .await
        .map_err(anyhow::Error::msg)?;
        log_info!("Seeded {} demo members", seeded);
    }

    let page = commands::list_members(
        ListMembersRequest::default(),
        &database,
        Arc::clone(&repository),
        config.paging,
    )
    .await
    .map_err(anyhow::Error::msg)?;
    println!("{}", serde_json::to_string_pretty(&page)?);

    match commands::find_member(FindMemberRequest { id: 1 }, &database, Arc::clone(&repository)).await {
        Ok(username) => println!("{}", serde_json::json!({ "id": 1, "username": username })),
        Err(e) => log_warn!("Member #1 unavailable: {}", e),
    }

    let status = database.pool_status();
    log_info!(
        "Pool: {} connection(s), {} idle, max {}",
        status.connections,
        status.idle_connections,
        status.max_size
    );
    Ok(())
}
