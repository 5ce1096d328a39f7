//! Append-only fetch cache with per-key request coalescing.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, FetchError>>>;

enum Entry<V> {
    Pending(SharedFetch<V>),
    Ready(Arc<V>),
}

/// Caches fetched values by key for the whole session.
///
/// At most one fetch per key is in flight: later callers join it. Successful
/// values are never evicted. Failures remove the entry so the next call
/// fetches again.
pub struct DetailCache<K, V> {
    entries: Arc<Mutex<HashMap<K, Entry<V>>>>,
}

impl<K, V> Clone for DetailCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for DetailCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> DetailCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous lookup of a completed value.
    #[must_use]
    pub fn cached(&self, key: &K) -> Option<Arc<V>> {
        match lock(&self.entries).get(key) {
            Some(Entry::Ready(value)) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        matches!(lock(&self.entries).get(key), Some(Entry::Ready(_)))
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        matches!(lock(&self.entries).get(key), Some(Entry::Pending(_)))
    }

    /// Number of completed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries)
            .values()
            .filter(|entry| matches!(entry, Entry::Ready(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value, join the in-flight fetch, or start one.
    ///
    /// `producer` is only invoked when neither a value nor a pending fetch
    /// exists; it is called under the cache lock and must only build the
    /// future. The value is stored before the returned future resolves.
    pub fn get_or_fetch<F, Fut>(
        &self,
        key: K,
        producer: F,
    ) -> BoxFuture<'static, Result<Arc<V>, FetchError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let mut entries = lock(&self.entries);
        match entries.get(&key) {
            Some(Entry::Ready(value)) => {
                let value = Arc::clone(value);
                return async move { Ok(value) }.boxed();
            }
            Some(Entry::Pending(fetch)) => return fetch.clone().boxed(),
            None => {}
        }

        let fetch = producer();
        let cache = Arc::clone(&self.entries);
        let owned_key = key.clone();
        let shared = async move {
            let result = fetch.await.map(Arc::new);
            let mut entries = lock(&cache);
            match &result {
                Ok(value) => {
                    entries.insert(owned_key, Entry::Ready(Arc::clone(value)));
                }
                Err(_) => {
                    entries.remove(&owned_key);
                }
            }
            result
        }
        .boxed()
        .shared();

        entries.insert(key, Entry::Pending(shared.clone()));
        shared.boxed()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
