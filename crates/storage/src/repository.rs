use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Largest serialized value accepted per key (5 MiB).
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

const CHANGE_BUFFER: usize = 256;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("value for \"{key}\" is {size} bytes, over the {limit} byte quota")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Identifies one execution context (a "tab") attached to a shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A write observed by a subscriber.
///
/// `value` is `None` when the notification stream lagged and the subscriber
/// must re-read the key itself.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub value: Option<Value>,
    pub(crate) origin: Option<ContextId>,
}

/// Change feed for a single key, filtered to writes from other contexts.
pub struct Subscription {
    key: String,
    own: ContextId,
    rx: broadcast::Receiver<StoreChange>,
}

impl Subscription {
    pub(crate) fn new(key: &str, own: ContextId, rx: broadcast::Receiver<StoreChange>) -> Self {
        Self {
            key: key.to_owned(),
            own,
            rx,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next change to this key made by another context.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<StoreChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.key == self.key && change.origin != Some(self.own) => {
                    return Some(change);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(key = %self.key, skipped, "store change feed lagged");
                    return Some(StoreChange {
                        key: self.key.clone(),
                        value: None,
                        origin: None,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Origin-scoped key-value store shared by every context of the app.
///
/// Writes become visible to all contexts; `subscribe` only reports writes made
/// elsewhere. There is no retry: failures go straight back to the caller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or holds invalid JSON.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a key and notify other contexts.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` for oversized values, or other
    /// storage errors if the write fails.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Subscribe to writes of `key` made by other contexts.
    fn subscribe(&self, key: &str) -> Subscription;
}

impl dyn KeyValueStore {
    /// Read and decode a typed value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored JSON does not match `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// Encode and write a typed value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if `value` cannot be encoded, or
    /// whatever `set` reports.
    pub async fn set_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value =
            serde_json::to_value(value).map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.set(key, value).await
    }
}

/// Serialize `value` and enforce the per-key quota.
pub(crate) fn encode_within_quota(
    key: &str,
    value: &Value,
    limit: usize,
) -> Result<String, StorageError> {
    let encoded =
        serde_json::to_string(value).map_err(|err| StorageError::Serialization(err.to_string()))?;
    if encoded.len() > limit {
        return Err(StorageError::QuotaExceeded {
            key: key.to_owned(),
            size: encoded.len(),
            limit,
        });
    }
    Ok(encoded)
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

struct SharedMemory {
    entries: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
    quota: usize,
}

/// In-memory store for tests and prototyping.
///
/// Every `handle()` is a separate context over the same entries.
#[derive(Clone)]
pub struct InMemoryKeyValueStore {
    shared: Arc<SharedMemory>,
    origin: ContextId,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            shared: Arc::new(SharedMemory {
                entries: Mutex::new(HashMap::new()),
                changes,
                quota,
            }),
            origin: ContextId::next(),
        }
    }

    /// Open another context over the same entries.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            origin: ContextId::next(),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let guard = self
            .shared
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        encode_within_quota(key, &value, self.shared.quota)?;
        {
            let mut guard = self
                .shared
                .entries
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.insert(key.to_owned(), value.clone());
        }
        debug!(key, "memory store write");
        // No receivers is not an error: nobody else is listening yet.
        let _ = self.shared.changes.send(StoreChange {
            key: key.to_owned(),
            value: Some(value),
            origin: Some(self.origin),
        });
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Subscription {
        Subscription::new(key, self.origin, self.shared.changes.subscribe())
    }
}

/// Aggregates the store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        Self { kv }
    }
}
