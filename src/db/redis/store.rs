use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;

use crate::db::store::{KeyValueStore, StoreResult};

/// Creates a Redis client for caching
///
/// Opening a client only validates the URL; no connection is made until the
/// first command runs.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed key-value store
///
/// The connection manager is created lazily on first use. If redis is down at
/// that point the error is returned and the next call tries again, so the
/// service can start before redis does.
pub struct RedisStore {
    client: Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!("Opening redis connection manager");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        // redis rejects a zero expiry
        let _: () = conn.set_ex(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let updated: bool = conn.expire(key, ttl_secs as i64).await?;
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let mut conn = self.connection().await?;
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok((next, keys))
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_redis_client_rejects_bad_url() {
        assert!(create_redis_client("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_redis_reports_error() {
        // Nothing listens on port 1; every command must fail rather than hang
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let store = RedisStore::new(client);
        assert!(store.ping().await.is_err());
        assert!(store.get("anything").await.is_err());
    }
}
