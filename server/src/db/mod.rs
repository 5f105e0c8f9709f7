//! Database Layer
//!
//! `PostgreSQL` connection pool, schema migrations, and the sqlx-backed
//! membership store.

mod store;


use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub use store::{PgSnapshot, PgStore};

use crate::config::Config;

/// Create `PostgreSQL` connection pool with health configuration.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(config.db_min_connections)
        .max_connections(config.db_max_connections)
        // Fail checks fast instead of queueing behind an exhausted pool
        .acquire_timeout(config.acquire_timeout())
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await?;

    info!(
        max_connections = config.db_max_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}
