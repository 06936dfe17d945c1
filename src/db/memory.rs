use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::store::{glob_match, KeyValueStore, StoreError, StoreResult};

/// Stored value: either a plain string or a hash of fields
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local key-value store with redis semantics
///
/// Used when no redis is configured and throughout the test suite. Expired
/// entries are dropped on read and swept on every write.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries so keys that are never read again do not pile up
    fn purge_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }

    /// Live keys matching `pattern`, sorted so scan cursors are stable
    async fn matching_keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let expired = matches!(entries.get(key), Some(entry) if !entry.is_live(now));
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        match entries.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::Backend(format!(
                "WRONGTYPE key {} holds a hash",
                key
            ))),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> StoreResult<()> {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(ttl_secs);
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let ttl = match entries.get(key) {
            Some(entry) if entry.is_live(now) => match entry.expires_at {
                Some(at) => {
                    let remaining = at.saturating_duration_since(now);
                    // Round up like redis does, so a fresh 60s key reports 60
                    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                    secs as i64
                }
                None => -1,
            },
            _ => -2,
        };
        Ok(ttl)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self.matching_keys(pattern).await)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let keys = self.matching_keys(pattern).await;
        let start = cursor as usize;
        if start >= keys.len() {
            return Ok((0, Vec::new()));
        }

        let end = (start + count.max(1)).min(keys.len());
        let next = if end >= keys.len() { 0 } else { end as u64 };
        Ok((next, keys[start..end].to_vec()))
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Hash(fields) => Ok(fields.get(field).cloned()),
                Value::Str(_) => Err(StoreError::Backend(format!(
                    "WRONGTYPE key {} holds a string",
                    key
                ))),
            },
            _ => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });

        if !entry.is_live(now) {
            *entry = Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            };
        }

        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(field.to_string(), value);
                Ok(())
            }
            Value::Str(_) => Err(StoreError::Backend(format!(
                "WRONGTYPE key {} holds a string",
                key
            ))),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 60).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[test]
    fn test_ping_and_delete_without_runtime_attribute() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(store.ping().await);
            tokio_test::assert_ok!(store.set_ex("a", "1".to_string(), 60).await);
            assert_eq!(tokio_test::assert_ok!(store.delete(&["a".to_string()]).await), 1);
        });
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 0).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.ttl("a").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let store = MemoryStore::new();
        store.set_ex("stale-1", "1".to_string(), 0).await.unwrap();
        store.set_ex("stale-2", "2".to_string(), 0).await.unwrap();
        assert_eq!(store.ttl("stale-1").await.unwrap(), -2);
        assert!(store.keys("stale-*").await.unwrap().is_empty());

        store.set_ex("fresh", "3".to_string(), 60).await.unwrap();
        store.hset("h", "f", "v".to_string()).await.unwrap();

        let entries = store.entries.read().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("fresh"));
        assert!(entries.contains_key("h"));
    }

    #[tokio::test]
    async fn test_ttl_semantics() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 60).await.unwrap();
        assert_eq!(store.ttl("a").await.unwrap(), 60);

        store.hset("h", "f", "v".to_string()).await.unwrap();
        assert_eq!(store.ttl("h").await.unwrap(), -1);
        assert_eq!(store.ttl("missing").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_expire_updates_ttl() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 60).await.unwrap();
        assert!(store.expire("a", 600).await.unwrap());
        assert_eq!(store.ttl("a").await.unwrap(), 600);
        assert!(!store.expire("missing", 600).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 60).await.unwrap();
        store.set_ex("b", "2".to_string(), 60).await.unwrap();

        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_scan_pages_through_all_matches() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .set_ex(&format!("product:US:{}", i), "x".to_string(), 60)
                .await
                .unwrap();
        }
        store
            .set_ex("product:ES:0", "x".to_string(), 60)
            .await
            .unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, page) = store.scan(cursor, "product:US:*", 3).await.unwrap();
            assert!(page.len() <= 3);
            seen.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        assert_eq!(seen.len(), 7);
        assert!(seen.iter().all(|k| k.starts_with("product:US:")));
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let store = MemoryStore::new();
        store.hset("user_prefs:u1", "market", "ES".to_string()).await.unwrap();
        assert_eq!(
            store.hget("user_prefs:u1", "market").await.unwrap(),
            Some("ES".to_string())
        );
        assert_eq!(store.hget("user_prefs:u1", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.set_ex("a", "1".to_string(), 60).await.unwrap();
        assert!(store.hget("a", "f").await.is_err());
    }
}
