//! Collection setup command.
//!
//! # Usage
//!
//! ```bash
//! signup-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SIGNUP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SIGNUP_DB_SCHEMA`, `SIGNUP_USERS_COLLECTION`, `SIGNUP_PENDING_COLLECTION` - names
//!
//! Creates the schema, one table per collection, the unique email indexes and
//! the containment indexes. Safe to run repeatedly.

use super::{CommandError, connect};

/// Create the signup schema and collections.
///
/// # Errors
///
/// Returns `CommandError` if configuration is missing or a statement fails.
pub async fn run() -> Result<(), CommandError> {
    let store = connect().await?;

    tracing::info!("Creating signup collections...");
    store.ensure_schema().await?;

    tracing::info!("Signup collections ready");
    Ok(())
}
