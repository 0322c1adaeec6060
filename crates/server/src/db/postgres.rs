//! `PostgreSQL` document store.
//!
//! Each collection is a table `(id UUID, doc JSONB, created_at TIMESTAMPTZ)`
//! in the configured schema. Filters use JSONB containment (`doc @> $1`) and
//! patches use JSONB concatenation (`doc || $2`), so only top-level scalar
//! equality and assignment are supported.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{
    Collection, Document, DocumentStore, Filter, Patch, StoreError, StoreNamespace, fields,
    validate_identifier,
};

/// Document store backed by `PostgreSQL` JSONB tables.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    namespace: StoreNamespace,
}

impl PgDocumentStore {
    /// Create a store over `pool` using the tables named by `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DataCorruption` if a schema or collection name is
    /// not a plain lowercase identifier.
    pub fn new(pool: PgPool, namespace: StoreNamespace) -> Result<Self, StoreError> {
        for name in [
            &namespace.schema,
            &namespace.users,
            &namespace.pending_signups,
        ] {
            validate_identifier(name).map_err(|reason| {
                StoreError::DataCorruption(format!("invalid store name {name:?}: {reason}"))
            })?;
        }
        Ok(Self { pool, namespace })
    }

    /// Get the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fully qualified table name for `collection`.
    fn table(&self, collection: Collection) -> String {
        format!(
            "{}.{}",
            self.namespace.schema,
            self.namespace.collection_name(collection)
        )
    }

    /// Create the schema, tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if any statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.namespace.schema
        ))
        .execute(&self.pool)
        .await?;

        for collection in Collection::ALL {
            let table = self.table(collection);
            let name = self.namespace.collection_name(collection);

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id UUID PRIMARY KEY,
                    doc JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
            ))
            .execute(&self.pool)
            .await?;

            for field in collection.unique_fields() {
                sqlx::query(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {name}_{field}_key ON {table} ((doc->>'{field}'))"
                ))
                .execute(&self.pool)
                .await?;
            }

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name}_doc_idx ON {table} USING GIN (doc jsonb_path_ops)"
            ))
            .execute(&self.pool)
            .await?;

            tracing::info!(table = %table, "Collection ready");
        }

        Ok(())
    }
}

/// Map an insert/update error, turning unique violations into conflicts.
fn map_write_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = error
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(
            db_err
                .constraint()
                .map_or_else(|| "duplicate document".to_owned(), ToOwned::to_owned),
        );
    }
    StoreError::Database(error)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let row: Option<(Uuid, Json<Document>)> = sqlx::query_as(&format!(
            "SELECT id, doc FROM {} WHERE doc @> $1 LIMIT 1",
            self.table(collection)
        ))
        .bind(Json(filter.to_value()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, Json(mut document))| {
            document.insert(fields::ID.to_owned(), Value::String(id.to_string()));
            document
        }))
    }

    async fn insert_one(
        &self,
        collection: Collection,
        mut document: Document,
    ) -> Result<Uuid, StoreError> {
        document.remove(fields::ID);
        let id = Uuid::new_v4();

        sqlx::query(&format!(
            "INSERT INTO {} (id, doc) VALUES ($1, $2)",
            self.table(collection)
        ))
        .bind(id)
        .bind(Json(Value::Object(document)))
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(id)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        let table = self.table(collection);
        let result = sqlx::query(&format!(
            "UPDATE {table} SET doc = doc || $2
             WHERE id = (SELECT id FROM {table} WHERE doc @> $1 LIMIT 1 FOR UPDATE)"
        ))
        .bind(Json(filter.to_value()))
        .bind(Json(patch.to_value()))
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let table = self.table(collection);
        let result = sqlx::query(&format!(
            "DELETE FROM {table}
             WHERE id = (SELECT id FROM {table} WHERE doc @> $1 LIMIT 1 FOR UPDATE)"
        ))
        .bind(Json(filter.to_value()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_stale(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE (doc->>'{}')::timestamptz < $1",
            self.table(collection),
            fields::UPDATED_AT
        ))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
