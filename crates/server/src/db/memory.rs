//! In-process document store.
//!
//! Backs the integration tests and `SIGNUP_STORE=memory` local runs. Enforces
//! the same unique `email` constraint as the `PostgreSQL` indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Collection, Document, DocumentStore, Filter, Patch, StoreError, fields};

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Uuid,
    document: Document,
}

impl StoredDocument {
    /// The document as callers see it, with its `id` field.
    fn to_output(&self) -> Document {
        let mut document = self.document.clone();
        document.insert(fields::ID.to_owned(), Value::String(self.id.to_string()));
        document
    }
}

/// Document store held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<Collection, Vec<StoredDocument>>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }

    /// Every document in `collection` matching `filter`.
    pub async fn find_all(&self, collection: Collection, filter: &Filter) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|stored| filter.matches(&stored.document))
                    .map(StoredDocument::to_output)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Returns the first unique field of `candidate` already held by another document.
fn unique_violation(
    collection: Collection,
    documents: &[StoredDocument],
    candidate: &Document,
    skip: Option<Uuid>,
) -> Option<&'static str> {
    collection.unique_fields().iter().copied().find(|field| {
        candidate.get(*field).is_some_and(|value| {
            documents
                .iter()
                .filter(|stored| Some(stored.id) != skip)
                .any(|stored| stored.document.get(*field) == Some(value))
        })
    })
}

fn is_stale(document: &Document, cutoff: DateTime<Utc>) -> bool {
    document
        .get(fields::UPDATED_AT)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .is_some_and(|updated_at| updated_at.with_timezone(&Utc) < cutoff)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).and_then(|documents| {
            documents
                .iter()
                .find(|stored| filter.matches(&stored.document))
                .map(StoredDocument::to_output)
        }))
    }

    async fn insert_one(
        &self,
        collection: Collection,
        mut document: Document,
    ) -> Result<Uuid, StoreError> {
        document.remove(fields::ID);

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection).or_default();

        if let Some(field) = unique_violation(collection, documents, &document, None) {
            return Err(StoreError::Conflict(format!("duplicate value for {field}")));
        }

        let id = Uuid::new_v4();
        documents.push(StoredDocument { id, document });
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let Some(position) = documents
            .iter()
            .position(|stored| filter.matches(&stored.document))
        else {
            return Ok(0);
        };

        let Some(target) = documents.get(position) else {
            return Ok(0);
        };
        let mut updated = target.document.clone();
        patch.apply(&mut updated);
        updated.remove(fields::ID);

        if let Some(field) = unique_violation(collection, documents, &updated, Some(target.id)) {
            return Err(StoreError::Conflict(format!("duplicate value for {field}")));
        }

        if let Some(target) = documents.get_mut(position) {
            target.document = updated;
        }
        Ok(1)
    }

    async fn delete_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        match documents
            .iter()
            .position(|stored| filter.matches(&stored.document))
        {
            Some(position) => {
                documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_stale(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|stored| !is_stale(&stored.document, cutoff));
        Ok((before - documents.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[tokio::test]
    async fn test_find_returns_id_field() {
        let store = MemoryDocumentStore::new();
        let id = store
            .insert_one(Collection::Users, doc(json!({"email": "a@x.com"})))
            .await
            .unwrap();

        let found = store
            .find_one(Collection::Users, &Filter::new().eq("email", "a@x.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("id"), Some(&json!(id.to_string())));
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = MemoryDocumentStore::new();
        let found = store
            .find_one(Collection::Users, &Filter::new().eq("email", "a@x.com"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryDocumentStore::new();
        store
            .insert_one(Collection::PendingSignups, doc(json!({"email": "dup@x.com"})))
            .await
            .unwrap();

        let second = store
            .insert_one(Collection::PendingSignups, doc(json!({"email": "dup@x.com"})))
            .await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(store.count(Collection::PendingSignups).await, 1);

        // Uniqueness is per collection.
        store
            .insert_one(Collection::Users, doc(json!({"email": "dup@x.com"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_patches_first_match_only() {
        let store = MemoryDocumentStore::new();
        store
            .insert_one(
                Collection::PendingSignups,
                doc(json!({"email": "a@x.com", "signupToken": "t1"})),
            )
            .await
            .unwrap();

        let matched = store
            .update_one(
                Collection::PendingSignups,
                &Filter::new().eq("signupToken", "t1"),
                &Patch::new().set("otp", 123_456),
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let missing = store
            .update_one(
                Collection::PendingSignups,
                &Filter::new().eq("signupToken", "t2"),
                &Patch::new().set("otp", 1),
            )
            .await
            .unwrap();
        assert_eq!(missing, 0);

        let found = store
            .find_one(
                Collection::PendingSignups,
                &Filter::new().eq("signupToken", "t1").eq("otp", 123_456),
            )
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_update_cannot_duplicate_email() {
        let store = MemoryDocumentStore::new();
        for (email, token) in [("a@x.com", "t1"), ("b@x.com", "t2")] {
            store
                .insert_one(
                    Collection::PendingSignups,
                    doc(json!({"email": email, "signupToken": token})),
                )
                .await
                .unwrap();
        }

        let result = store
            .update_one(
                Collection::PendingSignups,
                &Filter::new().eq("signupToken", "t2"),
                &Patch::new().set("email", "a@x.com"),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = MemoryDocumentStore::new();
        store
            .insert_one(Collection::PendingSignups, doc(json!({"email": "a@x.com"})))
            .await
            .unwrap();

        let filter = Filter::new().eq("email", "a@x.com");
        assert_eq!(
            store
                .delete_one(Collection::PendingSignups, &filter)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .delete_one(Collection::PendingSignups, &filter)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_delete_stale_uses_updated_at() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();
        let old = now - Duration::minutes(90);

        store
            .insert_one(
                Collection::PendingSignups,
                doc(json!({"email": "old@x.com", "updatedAt": old.to_rfc3339()})),
            )
            .await
            .unwrap();
        store
            .insert_one(
                Collection::PendingSignups,
                doc(json!({"email": "new@x.com", "updatedAt": now.to_rfc3339()})),
            )
            .await
            .unwrap();

        let removed = store
            .delete_stale(Collection::PendingSignups, now - Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(Collection::PendingSignups).await, 1);
    }
}
