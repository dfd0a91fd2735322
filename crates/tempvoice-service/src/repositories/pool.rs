//! Postgres connection pool for the `Pg*` stores.

use crate::errors::TempVoiceError;
use common::config::DatabaseConfig;
use common::secret::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info, instrument};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Pool settings for `config`.
#[must_use]
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
}

/// Connect the pool the stores share.
#[instrument(skip_all, name = "tv.repo.connect", fields(max_connections = config.max_connections))]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, TempVoiceError> {
    info!(target: "tv.repo", "Connecting to database");
    let pool = pool_options(config)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| {
            error!(target: "tv.repo", error = %e, "Failed to connect to database");
            TempVoiceError::from(e)
        })?;
    info!(target: "tv.repo", "Database connection established");
    Ok(pool)
}
