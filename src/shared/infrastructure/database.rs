use crate::shared::config::DatabaseConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::{log_debug, log_info};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use uuid::Uuid;

use super::unit_of_work::UnitOfWork;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Per-connection pragmas applied whenever the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u64,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas).map_err(r2d2::Error::QueryError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Begin {
    Deferred,
    Immediate,
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    config: DatabaseConfig,
}

impl Database {
    pub fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(config.url.clone());
        let options = ConnectionOptions {
            busy_timeout_ms: config.busy_timeout_ms,
            wal: !config.is_in_memory(),
        };

        let builder = r2d2::Pool::builder()
            .max_size(config.max_connections.max(1))
            .connection_timeout(Duration::from_secs(10))
            .test_on_check_out(true)
            .connection_customizer(Box::new(options));

        // Every connection to `:memory:` opens a fresh database, so keep exactly one alive
        let builder = if config.is_in_memory() {
            builder
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            builder
                .idle_timeout(Some(Duration::from_secs(300)))
                .max_lifetime(Some(Duration::from_secs(1800)))
        };

        let pool = builder.build(manager).map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to create connection pool: {}", e))
        })?;

        log_info!(
            "Database connection pool initialized for {} with max_size: {}",
            config.url,
            pool.max_size()
        );

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Migrated in-memory store, mostly for tests and demos
    pub fn in_memory() -> AppResult<Self> {
        let database = Self::new(&DatabaseConfig::in_memory())?;
        database.run_migrations()?;
        Ok(database)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn run_migrations(&self) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| AppError::DatabaseError(format!("Failed to run migrations: {}", e)))?;
        log_info!("Applied {} pending migration(s)", applied.len());
        Ok(())
    }

    pub fn get_connection(&self) -> AppResult<DbConnection> {
        let start = std::time::Instant::now();

        match self.pool.get() {
            Ok(conn) => {
                let duration = start.elapsed().as_millis() as u64;
                if duration > 100 {
                    LogContext::performance_metric("db_connection_acquire", duration, Some("slow"));
                }
                Ok(conn)
            }
            Err(e) => {
                LogContext::error_with_context(
                    &e,
                    "Failed to acquire database connection from pool",
                );
                Err(AppError::from(e))
            }
        }
    }

    /// Run `work` inside one transaction. Pending changes are flushed before
    /// commit; any error rolls everything back.
    pub fn unit_of_work<T>(
        &self,
        work: impl FnOnce(&mut UnitOfWork<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        self.transact(Begin::Deferred, work)
    }

    /// Like [`Database::unit_of_work`], but takes the store's write lock when the
    /// transaction begins. Use for read-then-write work that must not interleave
    /// with other writers.
    pub fn locking_unit_of_work<T>(
        &self,
        work: impl FnOnce(&mut UnitOfWork<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        self.transact(Begin::Immediate, work)
    }

    fn transact<T>(
        &self,
        begin: Begin,
        work: impl FnOnce(&mut UnitOfWork<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut pooled = self.get_connection()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let id = Uuid::new_v4();
        let timer = TimedOperation::new("unit_of_work");

        let body = |conn: &mut SqliteConnection| -> AppResult<T> {
            let mut uow = UnitOfWork::new(id, conn);
            LogContext::unit_of_work(&id, "begin", 0);
            let value = work(&mut uow)?;
            uow.flush()?;
            LogContext::unit_of_work(&id, "commit", uow.stats().statements);
            Ok(value)
        };

        let result = match begin {
            Begin::Deferred => conn.transaction(body),
            Begin::Immediate => conn.immediate_transaction(body),
        };

        let duration = timer.finish();
        if let Err(e) = &result {
            log_debug!("UoW {} rolled back after {}ms: {}", id, duration, e);
        }
        result
    }

    /// Run blocking store work on the blocking thread pool.
    pub async fn run<T, F>(&self, work: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
    {
        let database = self.clone();
        tokio::task::spawn_blocking(move || work(&database)).await?
    }

    /// Get pool statistics for monitoring
    pub fn pool_status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle_connections: state.idle_connections,
            max_size: self.pool.max_size(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_holds_one_connection() {
        let database = Database::in_memory().unwrap();
        let status = database.pool_status();
        assert_eq!(status.max_size, 1);

        let total = database
            .unit_of_work(|uow| uow.count_rows("SELECT COUNT(*) AS count FROM member"))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn failed_work_rolls_back() {
        let database = Database::in_memory().unwrap();
        let result: AppResult<()> = database.unit_of_work(|uow| {
            uow.execute_sql("INSERT INTO team (name) VALUES ('teamA')")?;
            Err(AppError::InvalidInput("abort".to_string()))
        });
        assert!(result.is_err());

        let total = database
            .unit_of_work(|uow| uow.count_rows("SELECT COUNT(*) AS count FROM team"))
            .unwrap();
        assert_eq!(total, 0);
    }
}
