/// Application configuration loaded from the environment (and `.env` when present)
use std::env;
use std::str::FromStr;

use crate::shared::errors::{AppError, AppResult};

pub const IN_MEMORY_URL: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub paging: PagingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file path, optionally prefixed with `sqlite://`, or `:memory:`
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PagingConfig {
    pub default_size: u32,
    pub max_size: u32,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let url = env::var("DATABASE_URL").map_err(|_| {
            AppError::Configuration("DATABASE_URL environment variable not found".to_string())
        })?;

        let database = DatabaseConfig {
            url: DatabaseConfig::validate_url(&url)?,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS")?
                .unwrap_or_else(DatabaseConfig::optimal_pool_size),
            busy_timeout_ms: parse_var("DATABASE_BUSY_TIMEOUT_MS")?.unwrap_or(5_000),
        };

        let defaults = PagingConfig::default();
        let paging = PagingConfig {
            default_size: parse_var("PAGE_DEFAULT_SIZE")?.unwrap_or(defaults.default_size),
            max_size: parse_var("PAGE_MAX_SIZE")?.unwrap_or(defaults.max_size),
        };
        if paging.default_size == 0 || paging.default_size > paging.max_size {
            return Err(AppError::Configuration(format!(
                "PAGE_DEFAULT_SIZE must be between 1 and {}",
                paging.max_size
            )));
        }

        Ok(Self { database, paging })
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: IN_MEMORY_URL.to_string(),
            max_connections: 1,
            busy_timeout_ms: 5_000,
        }
    }

    pub fn file(path: &str) -> Self {
        Self {
            url: path.to_string(),
            max_connections: Self::optimal_pool_size(),
            busy_timeout_ms: 5_000,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url == IN_MEMORY_URL
    }

    fn validate_url(url: &str) -> AppResult<String> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Err(AppError::Configuration(
                "Only SQLite databases are supported; DATABASE_URL must be a file path or :memory:"
                    .to_string(),
            ));
        }
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        if path.is_empty() {
            return Err(AppError::Configuration("DATABASE_URL is empty".to_string()));
        }
        Ok(path.to_string())
    }

    /// Pool size based on CPU count, capped for a single-file store
    fn optimal_pool_size() -> u32 {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        std::cmp::min(cpu_count * 2, 20) as u32
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 2000,
        }
    }
}

impl PagingConfig {
    /// Requested size, falling back to the default and clamped to the maximum.
    pub fn effective_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(0) | None => self.default_size,
            Some(size) => std::cmp::min(size, self.max_size),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> AppResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Configuration(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
