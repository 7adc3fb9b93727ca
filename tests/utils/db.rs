/// Database test utilities
///
/// Every test gets its own store: an in-memory database for single-connection
/// work, or a temporary file when several connections must see the same data.
use roster::shared::config::DatabaseConfig;
use roster::shared::Database;
use tempfile::TempDir;

/// Migrated in-memory database. Its pool holds a single connection.
pub fn in_memory() -> Database {
    Database::in_memory().expect("Failed to create in-memory database")
}

/// Migrated file database in a temporary directory, removed when dropped.
pub struct FileDb {
    pub database: Database,
    _dir: TempDir,
}

impl FileDb {
    pub fn new(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("roster-test.db");
        let mut config = DatabaseConfig::file(path.to_str().expect("utf-8 temp path"));
        config.max_connections = max_connections;
        config.busy_timeout_ms = 10_000;

        let database = Database::new(&config).expect("Failed to open file database");
        database.run_migrations().expect("Failed to run migrations");
        Self { database, _dir: dir }
    }
}
