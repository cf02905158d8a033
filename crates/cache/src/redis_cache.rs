use async_trait::async_trait;
use common::Deadline;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::store::{KeyValueCache, LeaseStore, MappingStore};
use crate::CacheError;

/// Compare-and-delete so a holder never releases someone else's lease
const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// HINCRBY + PEXPIRE in one step, refused when the sum passes ARGV[3]
const BOUNDED_INCREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call("HGET", KEYS[1], ARGV[1]) or "0")
if current == nil then
    return redis.error_reply("hash value is not an integer")
end
local next = current + tonumber(ARGV[2])
if next > tonumber(ARGV[3]) then
    return false
end
redis.call("HINCRBY", KEYS[1], ARGV[1], ARGV[2])
redis.call("PEXPIRE", KEYS[1], ARGV[4])
return next
"#;

/// Redis-backed cache, mapping store and lease store.
///
/// One `ConnectionManager` is shared by every clone; it reconnects on its own
/// after a dropped connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

/// Redis rejects a zero expiry
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %redis_url, "Redis cache initialized");
        Ok(Self { conn })
    }

    /// Health check
    pub async fn ping(&self, deadline: Deadline) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = deadline
            .run(redis::cmd("PING").query_async(&mut conn))
            .await??;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, deadline: Deadline, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = deadline.run(conn.get(key)).await??;

        debug!(key = %key, hit = value.is_some(), "Redis GET");
        Ok(value)
    }

    async fn set(
        &self,
        deadline: Deadline,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = deadline
            .run(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await??;

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Redis SET");
        Ok(())
    }

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = deadline.run(conn.del(key)).await??;

        debug!(key = %key, "Redis DEL");
        Ok(())
    }
}

#[async_trait]
impl MappingStore for RedisCache {
    async fn field_get(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(deadline.run(conn.hget(key, field)).await??)
    }

    async fn field_set(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = deadline.run(conn.hset(key, field, value)).await??;
        Ok(())
    }

    async fn field_increment(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        Ok(deadline.run(conn.hincr(key, field, delta)).await??)
    }

    async fn increment_with_ttl(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        delta: i64,
        ceiling: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        let script = Script::new(BOUNDED_INCREMENT_SCRIPT);
        let total: Option<i64> = deadline
            .run(
                script
                    .key(key)
                    .arg(field)
                    .arg(delta)
                    .arg(ceiling)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await??;

        if total.is_none() {
            debug!(key = %key, field = %field, delta, ceiling, "Bounded increment refused");
        }
        Ok(total)
    }

    async fn field_delete(&self, deadline: Deadline, key: &str, field: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = deadline.run(conn.hdel(key, field)).await??;
        Ok(())
    }

    async fn get_all(&self, deadline: Deadline, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(deadline.run(conn.hgetall(key)).await??)
    }

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError> {
        KeyValueCache::delete(self, deadline, key).await
    }

    async fn expire(&self, deadline: Deadline, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = deadline
            .run(
                redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await??;
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for RedisCache {
    async fn try_acquire(
        &self,
        deadline: Deadline,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = deadline
            .run(
                redis::cmd("SET")
                    .arg(key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await??;

        Ok(reply.is_some())
    }

    async fn release(&self, deadline: Deadline, key: &str, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let script = Script::new(RELEASE_LEASE_SCRIPT);
        let deleted: i64 = deadline
            .run(script.key(key).arg(token).invoke_async(&mut conn))
            .await??;

        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[test]
    fn test_ttl_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_cache_operations() {
        let cache = RedisCache::new("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        let key = format!("test:{}", std::process::id());
        KeyValueCache::set(&cache, deadline(), &key, b"{\"test\":\"data\"}", Duration::from_secs(60))
            .await
            .unwrap();

        let cached = KeyValueCache::get(&cache, deadline(), &key).await.unwrap();
        assert_eq!(cached.as_deref(), Some(&b"{\"test\":\"data\"}"[..]));

        KeyValueCache::delete(&cache, deadline(), &key).await.unwrap();
        assert!(KeyValueCache::get(&cache, deadline(), &key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_hash_increment() {
        let cache = RedisCache::new("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        let key = format!("test:cart:{}", std::process::id());
        cache.field_increment(deadline(), &key, "p1", 2).await.unwrap();
        let total = cache.field_increment(deadline(), &key, "p1", 3).await.unwrap();
        assert_eq!(total, 5);

        MappingStore::delete(&cache, deadline(), &key).await.unwrap();
        assert!(cache.get_all(deadline(), &key).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_bounded_increment() {
        let cache = RedisCache::new("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        let key = format!("test:bounded:{}", std::process::id());
        let ttl = Duration::from_secs(60);
        assert_eq!(
            cache.increment_with_ttl(deadline(), &key, "p1", 8, 10, ttl).await.unwrap(),
            Some(8)
        );
        assert_eq!(
            cache.increment_with_ttl(deadline(), &key, "p1", 3, 10, ttl).await.unwrap(),
            None
        );
        assert_eq!(
            cache.field_get(deadline(), &key, "p1").await.unwrap().as_deref(),
            Some("8")
        );

        MappingStore::delete(&cache, deadline(), &key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_lease() {
        let cache = RedisCache::new("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        let key = format!("test:lease:{}", std::process::id());
        let ttl = Duration::from_secs(10);
        assert!(cache.try_acquire(deadline(), &key, "a", ttl).await.unwrap());
        assert!(!cache.try_acquire(deadline(), &key, "b", ttl).await.unwrap());
        assert!(!cache.release(deadline(), &key, "b").await.unwrap());
        assert!(cache.release(deadline(), &key, "a").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_ping() {
        let cache = RedisCache::new("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        assert!(cache.ping(deadline()).await.is_ok());
    }
}
