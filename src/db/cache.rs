use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::store::{KeyValueStore, StoreError, StoreResult};

/// Page size used when walking keys with SCAN
const SCAN_PAGE: usize = 200;

/// JSON cache adapter over any [`KeyValueStore`]
///
/// Every store call is bounded by `timeout`. The adapter has two faces:
/// `try_*` methods return a [`StoreResult`] so callers inside the crate can tell
/// a miss from a broken store, and the plain methods swallow failures into an
/// empty value (`None`, `false`, `0`, empty `Vec`) after counting them. The
/// plain methods are what the rest of the service should reach for.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
    errors: Arc<AtomicU64>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of store failures (errors and timeouts) seen so far
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Runs a store call under the timeout, counting and logging failures
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        };

        if let Err(e) = &result {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(op = op, backend = self.store.name(), error = %e, "Cache store call failed");
        }

        result
    }

    /// Retrieves and deserializes a value
    ///
    /// A value that no longer deserializes is reported as an error rather than
    /// a miss, since it means the stored shape drifted.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let raw = self.bounded("get", self.store.get(key)).await?;
        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "Cache deserialization error");
                    StoreError::Serialization(e)
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serializes and stores a value with an expiry
    pub async fn try_set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;
        self.bounded("set_ex", self.store.set_ex(key, json, ttl_secs))
            .await
    }

    pub async fn try_delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", self.store.delete(keys)).await
    }

    pub async fn try_ttl(&self, key: &str) -> StoreResult<i64> {
        self.bounded("ttl", self.store.ttl(key)).await
    }

    /// Collects keys matching `pattern` with SCAN, stopping once `limit` is reached
    pub async fn try_scan_keys(&self, pattern: &str, limit: Option<usize>) -> StoreResult<Vec<String>> {
        let mut cursor = 0;
        let mut keys = Vec::new();

        loop {
            let (next, page) = self
                .bounded("scan", self.store.scan(cursor, pattern, SCAN_PAGE))
                .await?;
            keys.extend(page);

            if let Some(limit) = limit {
                if keys.len() >= limit {
                    keys.truncate(limit);
                    break;
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub async fn try_hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.bounded("hget", self.store.hget(key, field)).await
    }

    pub async fn try_hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.bounded("hset", self.store.hset(key, field, value.to_string()))
            .await
    }

    pub async fn try_ping(&self) -> StoreResult<()> {
        self.bounded("ping", self.store.ping()).await
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.try_get(key).await.ok().flatten()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        match self.try_set(key, value, ttl_secs).await {
            Ok(()) => true,
            Err(StoreError::Serialization(e)) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                false
            }
            Err(_) => false,
        }
    }

    pub async fn delete(&self, keys: &[String]) -> u64 {
        self.try_delete(keys).await.unwrap_or(0)
    }

    pub async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        self.bounded("expire", self.store.expire(key, ttl_secs))
            .await
            .unwrap_or(false)
    }

    /// Remaining TTL in seconds, `None` when the key is missing or the store failed
    pub async fn ttl(&self, key: &str) -> Option<i64> {
        match self.try_ttl(key).await {
            Ok(ttl) if ttl >= -1 => Some(ttl),
            _ => None,
        }
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.bounded("keys", self.store.keys(pattern))
            .await
            .unwrap_or_default()
    }

    pub async fn scan_keys(&self, pattern: &str, limit: Option<usize>) -> Vec<String> {
        self.try_scan_keys(pattern, limit).await.unwrap_or_default()
    }

    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.try_hget(key, field).await.ok().flatten()
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> bool {
        self.try_hset(key, field, value).await.is_ok()
    }

    pub async fn ping(&self) -> bool {
        self.try_ping().await.is_ok()
    }
}
