//! Postgres pool and schema migrations

use std::time::Duration;

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

const CONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Could not reach the database after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

/// Connect, retrying with doubling back-off while the database comes up
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    let options = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600));

    let mut delay = Duration::from_millis(500);
    let mut attempt = 1;
    loop {
        tracing::info!(url = %config.database_url_masked(), attempt, "Connecting to database");
        match options.clone().connect(&config.database_url).await {
            Ok(pool) => {
                tracing::info!(
                    max_connections = config.db_max_connections,
                    "Database pool ready"
                );
                return Ok(pool);
            }
            Err(source) if attempt >= CONNECT_ATTEMPTS => {
                return Err(DbError::Connect {
                    attempts: attempt,
                    source,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Database not reachable");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Schema is up to date");
    Ok(())
}
