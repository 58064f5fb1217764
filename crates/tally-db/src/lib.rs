//! # tally-db
//!
//! PostgreSQL database layer for the tally categorization engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for mappings, jobs, rate limits, and expenses
//!
//! ## Example
//!
//! ```rust,ignore
//! use tally_db::Database;
//! use tally_core::{normalize_merchant, MappingRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tally").await?;
//!
//!     let key = normalize_merchant("WOOLWORTHS TOWN HALL 123");
//!     if let Some(mapping) = db.mappings.get_global(&key).await? {
//!         println!("{} -> {}", key, mapping.category);
//!     }
//!     Ok(())
//! }
//! ```
pub mod expenses;
pub mod jobs;
pub mod mappings;
pub mod pool;
pub mod rate_limit;

// Re-export core types
pub use tally_core::*;

// Re-export repository implementations
pub use expenses::PgExpenseRepository;
pub use jobs::PgCategorizationJobRepository;
pub use mappings::PgMappingRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use rate_limit::PgRateLimitRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Global and personal merchant mapping repository.
    pub mappings: PgMappingRepository,
    /// Categorization job queue repository.
    pub jobs: PgCategorizationJobRepository,
    /// Provider rate limit repository.
    pub rate_limits: PgRateLimitRepository,
    /// Expense repository for category reads and writes.
    pub expenses: PgExpenseRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            mappings: PgMappingRepository::new(pool.clone()),
            jobs: PgCategorizationJobRepository::new(pool.clone()),
            rate_limits: PgRateLimitRepository::new(pool.clone()),
            expenses: PgExpenseRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Ok(())
    }
}
