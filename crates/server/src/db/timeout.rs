//! Per-call time bound for any [`DocumentStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Collection, Document, DocumentStore, Filter, Patch, StoreError};

/// Wraps a store so that every operation fails with
/// [`StoreError::Timeout`] once `limit` has elapsed.
///
/// Dropping the inner future on expiry releases whatever it held (pool
/// connections, locks).
#[derive(Clone)]
pub struct TimeoutStore {
    inner: Arc<dyn DocumentStore>,
    limit: Duration,
}

impl TimeoutStore {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// The configured bound.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.limit, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl DocumentStore for TimeoutStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.bounded(self.inner.find_one(collection, filter)).await
    }

    async fn insert_one(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Uuid, StoreError> {
        self.bounded(self.inner.insert_one(collection, document))
            .await
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        self.bounded(self.inner.update_one(collection, filter, patch))
            .await
    }

    async fn delete_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        self.bounded(self.inner.delete_one(collection, filter))
            .await
    }

    async fn delete_stale(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.bounded(self.inner.delete_stale(collection, cutoff))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.inner.ping()).await
    }
}
