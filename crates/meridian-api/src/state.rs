//! Application state management

use crate::auth::jwt::JwtConfig;
use meridian_core::config::{AppConfig, DatabaseConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// PostgreSQL connection pool
    pub db: PgPool,
    /// Token signing settings
    pub jwt: JwtConfig,
}

impl AppState {
    pub fn new(config: AppConfig, db: PgPool) -> Self {
        let jwt = JwtConfig::from_config(&config);
        Self { config, db, jwt }
    }
}

/// Pool options: `pool_size` kept warm, up to `pool_size + max_overflow` open
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.pool_size)
        .max_connections(config.max_connections())
        .acquire_timeout(Duration::from_secs(10))
}

/// Build the pool without connecting; connections open on first use
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    pool_options(config).connect_lazy(&config.url)
}
