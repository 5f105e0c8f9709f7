//! Portcullis - Schema Migration Entry Point
//!
//! Connects to `PostgreSQL` and applies the authorization schema.

use anyhow::Result;
use tracing::info;

use portcullis::{config, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portcullis=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        inherit_by_default = config.inherit_by_default,
        "Starting Portcullis migrations"
    );

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    pool.close().await;

    info!("Authorization schema is up to date");
    Ok(())
}
