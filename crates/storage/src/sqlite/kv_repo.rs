use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use tracing::debug;

use crate::repository::{
    KeyValueStore, StorageError, StoreChange, Subscription, encode_within_quota,
};

use super::SqliteKeyValueStore;

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row
            .try_get("value")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let encoded = encode_within_quota(key, &value, self.quota)?;

        sqlx::query(
            r"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = kv_entries.version + 1,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(&encoded)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        debug!(key, bytes = encoded.len(), "sqlite store write");
        let _ = self.changes.send(StoreChange {
            key: key.to_owned(),
            value: Some(value),
            origin: Some(self.origin),
        });
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Subscription {
        Subscription::new(key, self.origin, self.changes.subscribe())
    }
}
