//! Abandoned signup cleanup.
//!
//! # Usage
//!
//! ```bash
//! signup-cli prune --older-than-minutes 60
//! ```
//!
//! Deletes pending signups whose `updatedAt` is older than the threshold.
//! This also removes records left behind when a promotion could not delete
//! its pending signup.

use chrono::{TimeDelta, Utc};
use signup_server::db::PendingSignupRepository;

use super::{CommandError, connect};

/// Delete pending signups untouched for `older_than_minutes`.
///
/// # Errors
///
/// Returns `CommandError` if configuration is missing or the delete fails.
pub async fn run(older_than_minutes: u32) -> Result<(), CommandError> {
    let store = connect().await?;
    let cutoff = Utc::now() - TimeDelta::minutes(i64::from(older_than_minutes));

    tracing::info!(%cutoff, "Pruning pending signups...");
    let removed = PendingSignupRepository::new(&store)
        .delete_stale(cutoff)
        .await?;

    tracing::info!(removed, "Pending signups pruned");
    Ok(())
}
