//! Database pool construction.
//!
//! One PostgreSQL pool is shared by the whole process: the tenant manager,
//! every tenant-scoped rule store, and the health endpoint all borrow it.
//! Evaluation itself never touches the pool once caches are warm, so the
//! sizing knobs in [`DatabaseConfig`] only need to cover mutation traffic
//! and cold-cache reads.

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Build the shared connection pool from configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "initializing database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    info!("database pool initialized");
    Ok(pool)
}

/// Cheap liveness probe used by the readiness endpoint.
pub async fn check_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
