//! CLI command implementations.

pub mod migrate;
pub mod prune;

use signup_server::config::{ConfigError, DatabaseConfig};
use signup_server::db::{self, PgDocumentStore, StoreError};
use thiserror::Error;

/// Errors shared by the database commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connect to the configured `PostgreSQL` store.
async fn connect() -> Result<PgDocumentStore, CommandError> {
    let config = DatabaseConfig::from_env()?;

    tracing::info!(schema = %config.namespace.schema, "Connecting to signup database...");
    let pool = db::create_pool(&config.database_url).await?;

    Ok(PgDocumentStore::new(pool, config.namespace)?)
}
