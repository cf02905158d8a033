use async_trait::async_trait;
use common::Deadline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::{KeyValueCache, LeaseStore, MappingStore};
use crate::CacheError;

#[derive(Debug, Clone)]
enum Value {
    Blob(Vec<u8>),
    Mapping(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct Faults {
    reads: AtomicBool,
    writes: AtomicBool,
    deletes: AtomicBool,
}

/// In-process stand-in for Redis used by tests and local wiring.
///
/// Clones share state. Expiry follows `tokio::time`, so paused-clock tests
/// can step past a TTL. Individual operation classes can be made to fail to
/// exercise degraded paths.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    faults: Arc<Faults>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every get, field read and listing
    pub fn fail_reads(&self, fail: bool) {
        self.faults.reads.store(fail, Ordering::SeqCst);
    }

    /// Fail every set, field write, increment, expire and lease acquire
    pub fn fail_writes(&self, fail: bool) {
        self.faults.writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every key delete, field delete and lease release
    pub fn fail_deletes(&self, fail: bool) {
        self.faults.deletes.store(fail, Ordering::SeqCst);
    }

    /// Fail everything
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_reads(unavailable);
        self.fail_writes(unavailable);
        self.fail_deletes(unavailable);
    }

    /// Whether a live entry exists under `key`
    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .map(|e| e.is_live(now))
            .unwrap_or(false)
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self, flag: &AtomicBool, deadline: Deadline) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        if deadline.is_expired() {
            return Err(CacheError::Timeout);
        }
        Ok(())
    }

    /// Drop `key` if it has expired, then hand back the live entry if any
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).map(|e| !e.is_live(now)).unwrap_or(false) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn mapping<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<&'a mut HashMap<String, String>, CacheError> {
        if Self::live(entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Mapping(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Mapping(fields)) => Ok(fields),
            _ => Err(type_error("key holds a non-mapping value")),
        }
    }
}

fn type_error(detail: &'static str) -> CacheError {
    CacheError::Redis(redis::RedisError::from((redis::ErrorKind::TypeError, detail)))
}

fn parse_integer(raw: &str) -> Result<i64, CacheError> {
    raw.parse::<i64>()
        .map_err(|_| type_error("hash value is not an integer"))
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, deadline: Deadline, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check(&self.faults.reads, deadline)?;
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(Value::Blob(bytes)) => Ok(Some(bytes.clone())),
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        deadline: Deadline,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.check(&self.faults.writes, deadline)?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: Value::Blob(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError> {
        self.check(&self.faults.deletes, deadline)?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryCache {
    async fn field_get(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, CacheError> {
        self.check(&self.faults.reads, deadline)?;
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(Value::Mapping(fields)) => Ok(fields.get(field).cloned()),
            _ => Ok(None),
        }
    }

    async fn field_set(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), CacheError> {
        self.check(&self.faults.writes, deadline)?;
        let mut entries = self.entries.lock().await;
        Self::mapping(&mut entries, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn field_increment(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, CacheError> {
        self.check(&self.faults.writes, deadline)?;
        let mut entries = self.entries.lock().await;
        let fields = Self::mapping(&mut entries, key)?;
        let current = match fields.get(field) {
            Some(raw) => parse_integer(raw)?,
            None => 0,
        };
        let next = current + delta;
        fields.insert(field.to_string(), next.to_string());
        Ok(next)
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
        self.check(&self.faults.writes, deadline)?;
        let mut entries = self.entries.lock().await;
        let current = match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(Value::Mapping(fields)) => match fields.get(field) {
                Some(raw) => parse_integer(raw)?,
                None => 0,
            },
            Some(Value::Blob(_)) => return Err(type_error("key holds a non-mapping value")),
            None => 0,
        };

        let next = current + delta;
        if next > ceiling {
            return Ok(None);
        }

        Self::mapping(&mut entries, key)?.insert(field.to_string(), next.to_string());
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(Some(next))
    }

    async fn field_delete(&self, deadline: Deadline, key: &str, field: &str) -> Result<(), CacheError> {
        self.check(&self.faults.deletes, deadline)?;
        let mut entries = self.entries.lock().await;
        let now_empty = match Self::live(&mut entries, key).map(|e| &mut e.value) {
            Some(Value::Mapping(fields)) => {
                fields.remove(field);
                fields.is_empty()
            }
            _ => false,
        };
        // Redis drops a hash once its last field is gone
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self, deadline: Deadline, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.check(&self.faults.reads, deadline)?;
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(Value::Mapping(fields)) => Ok(fields.clone()),
            _ => Ok(HashMap::new()),
        }
    }

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError> {
        KeyValueCache::delete(self, deadline, key).await
    }

    async fn expire(&self, deadline: Deadline, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check(&self.faults.writes, deadline)?;
        let mut entries = self.entries.lock().await;
        if let Some(entry) = Self::live(&mut entries, key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for MemoryCache {
    async fn try_acquire(
        &self,
        deadline: Deadline,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check(&self.faults.writes, deadline)?;
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Blob(token.as_bytes().to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn release(&self, deadline: Deadline, key: &str, token: &str) -> Result<bool, CacheError> {
        self.check(&self.faults.deletes, deadline)?;
        let mut entries = self.entries.lock().await;
        let held = matches!(
            Self::live(&mut entries, key).map(|e| &e.value),
            Some(Value::Blob(bytes)) if bytes.as_slice() == token.as_bytes()
        );
        if held {
            entries.remove(key);
        }
        Ok(held)
    }
}
