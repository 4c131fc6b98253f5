//! Persistence: the `Repository` boundary, its PostgreSQL and in-memory
//! implementations, and connection pooling.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod memory;
pub mod repository;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use memory::InMemoryRepository;
pub use repository::{IdKind, PgRepository, Repository};

/// A PostgreSQL pool sized from `DatabaseConfig`. Tables, tournaments,
/// cash games and the ledger all share it through `repository()`.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;
        log::info!(
            "Connected engine store ({}..={} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn repository(&self) -> PgRepository {
        PgRepository::new(self.pool.clone())
    }

    /// Wait for in-flight queries, then drop every connection.
    pub async fn shutdown(self) {
        self.pool.close().await;
    }
}
