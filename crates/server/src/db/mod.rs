//! Document storage for the signup pipeline.
//!
//! # Collections
//!
//! - `users` - Promoted, durable user accounts
//! - `pending_signups` - In-progress signups addressed by their signup token
//!
//! Both collections hold JSON documents with camelCase keys and a unique
//! `email` field. Business code talks to the typed repositories
//! ([`PendingSignupRepository`], [`UserRepository`]); those in turn use the
//! four [`DocumentStore`] primitives, so any backend that can find, insert,
//! update and delete one document by field equality can host the pipeline.
//!
//! # Backends
//!
//! - [`PgDocumentStore`] - `PostgreSQL` JSONB tables (production)
//! - [`MemoryDocumentStore`] - in-process store (tests, local development)
//!
//! Wrap either in [`TimeoutStore`] to bound every call.
//!
//! # Setup
//!
//! Tables and indexes are created by the CLI, not on server startup:
//! ```bash
//! cargo run -p signup-cli -- migrate
//! ```

pub mod memory;
pub mod pending_signups;
pub mod postgres;
pub mod timeout;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryDocumentStore;
pub use pending_signups::PendingSignupRepository;
pub use postgres::PgDocumentStore;
pub use timeout::TimeoutStore;
pub use users::UserRepository;

/// A stored JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Document field names shared by the repositories and the backends.
pub mod fields {
    pub const ID: &str = "id";
    pub const EMAIL: &str = "email";
    pub const SIGNUP_TOKEN: &str = "signupToken";
    pub const PASSWORD_HASH: &str = "passwordHash";
    pub const OTP: &str = "otp";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The operation did not finish within its bound.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// An update or delete matched no document.
    #[error("not found")]
    NotFound,

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// The two logical collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    PendingSignups,
}

impl Collection {
    /// Every collection, in creation order.
    pub const ALL: [Self; 2] = [Self::Users, Self::PendingSignups];

    /// Fields that must be unique across the collection.
    #[must_use]
    pub const fn unique_fields(self) -> &'static [&'static str] {
        &[fields::EMAIL]
    }
}

/// Top-level field equalities a document must satisfy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Document);

impl Filter {
    /// An empty filter (matches any document).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    /// Returns true if every constrained field of `document` matches.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// The filter as a JSON object (used for JSONB containment).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Top-level field assignments merged into a matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch(Document);

impl Patch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `field`.
    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    /// Merge the assignments into `document`.
    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.0 {
            document.insert(field.clone(), value.clone());
        }
    }

    /// Returns the assigned value for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The patch as a JSON object (used for JSONB concatenation).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Generic document persistence used by the repositories.
///
/// `find_one` returning `Ok(None)` is an ordinary empty result; errors mean
/// the store itself failed. Implementations must report unique-field
/// violations as [`StoreError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the first document matching `filter`.
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert a document and return its generated ID.
    async fn insert_one(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Uuid, StoreError>;

    /// Patch the first document matching `filter`; returns the matched count.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError>;

    /// Delete the first document matching `filter`; returns the deleted count.
    async fn delete_one(&self, collection: Collection, filter: &Filter)
    -> Result<u64, StoreError>;

    /// Delete every document whose `updatedAt` is older than `cutoff`.
    async fn delete_stale(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Schema and collection names for a store.
///
/// Names are spliced into SQL, so they are restricted to lowercase
/// identifiers (see [`validate_identifier`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNamespace {
    /// Database schema holding both collections.
    pub schema: String,
    /// Collection of promoted users.
    pub users: String,
    /// Collection of pending signups.
    pub pending_signups: String,
}

impl StoreNamespace {
    /// Name of the backing table for `collection`.
    #[must_use]
    pub fn collection_name(&self, collection: Collection) -> &str {
        match collection {
            Collection::Users => &self.users,
            Collection::PendingSignups => &self.pending_signups,
        }
    }
}

impl Default for StoreNamespace {
    fn default() -> Self {
        Self {
            schema: "signup".to_owned(),
            users: "users".to_owned(),
            pending_signups: "pending_signups".to_owned(),
        }
    }
}

/// Validate a schema or collection name: `[a-z_][a-z0-9_]*`, at most 63 bytes.
///
/// # Errors
///
/// Returns a description of the problem if the name is not a plain identifier.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("must not be empty".to_owned());
    };
    if name.len() > 63 {
        return Err("must be at most 63 characters".to_owned());
    }
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err("must start with a lowercase letter or underscore".to_owned());
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err("may only contain lowercase letters, digits and underscores".to_owned());
    }
    Ok(())
}

/// Serialize a record into a document.
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(StoreError::DataCorruption(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StoreError::DataCorruption(format!(
            "failed to serialize record: {e}"
        ))),
    }
}

/// Deserialize a stored document into a record.
pub(crate) fn from_document<T: DeserializeOwned>(
    document: Document,
    what: &str,
) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| StoreError::DataCorruption(format!("invalid {what} in store: {e}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
