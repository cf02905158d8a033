use common::metrics::{record_cache_invalidation, record_cache_request, CacheOutcome};
use common::{CircuitBreaker, CircuitBreakerError, Deadline};
use futures_util::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::store::KeyValueCache;
use crate::CacheError;

/// Budget for a single post-write invalidation
pub const INVALIDATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Typed read-through helper over a [`KeyValueCache`].
///
/// The cache is never a source of truth: a failed or undecodable read is a
/// miss and a failed write or invalidation is logged and dropped. Reads and
/// populating writes go through a shared circuit breaker; invalidations do
/// not.
#[derive(Clone)]
pub struct CacheAside {
    backend: Arc<dyn KeyValueCache>,
    breaker: Arc<CircuitBreaker>,
    cache_type: &'static str,
}

impl CacheAside {
    pub fn new(
        backend: Arc<dyn KeyValueCache>,
        breaker: Arc<CircuitBreaker>,
        cache_type: &'static str,
    ) -> Self {
        Self {
            backend,
            breaker,
            cache_type,
        }
    }

    /// Same backend and breaker, different metrics label
    pub fn with_type(&self, cache_type: &'static str) -> Self {
        Self {
            cache_type,
            ..self.clone()
        }
    }

    pub fn cache_type(&self) -> &'static str {
        self.cache_type
    }

    pub async fn get<T: DeserializeOwned>(&self, deadline: Deadline, key: &str) -> Option<T> {
        let result = self
            .breaker
            .call(deadline, self.backend.get(deadline, key))
            .await;

        match result {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    record_cache_request(self.cache_type, CacheOutcome::Hit);
                    Some(value)
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to deserialize cached value");
                    record_cache_request(self.cache_type, CacheOutcome::Error);
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                record_cache_request(self.cache_type, CacheOutcome::Miss);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %describe(&e), "Cache read failed, falling back to store");
                record_cache_request(self.cache_type, CacheOutcome::Error);
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, deadline: Deadline, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };

        let result = self
            .breaker
            .call(deadline, self.backend.set(deadline, key, &bytes, ttl))
            .await;

        match result {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached value"),
            Err(e) => warn!(key = %key, error = %describe(&e), "Failed to populate cache"),
        }
    }

    /// Drop `key` after a committed write.
    ///
    /// Runs under its own [`INVALIDATION_TIMEOUT`] and outside the breaker:
    /// the caller's deadline may already be spent by the write, and an open
    /// circuit must not leave the old value in place.
    pub async fn invalidate(&self, key: &str) {
        let deadline = Deadline::after(INVALIDATION_TIMEOUT);
        let result = match deadline.run(self.backend.delete(deadline, key)).await {
            Ok(result) => result,
            Err(elapsed) => Err(CacheError::from(elapsed)),
        };

        match result {
            Ok(()) => {
                debug!(key = %key, "Invalidated cache key");
                record_cache_invalidation(self.cache_type, true);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to invalidate cache key");
                record_cache_invalidation(self.cache_type, false);
            }
        }
    }

    /// Drop every key concurrently
    pub async fn invalidate_all<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        join_all(
            keys.into_iter()
                .map(|key| async move { self.invalidate(key.as_ref()).await }),
        )
        .await;
    }
}

fn describe(err: &CircuitBreakerError<CacheError>) -> String {
    match err {
        CircuitBreakerError::Open => "circuit open".to_string(),
        CircuitBreakerError::Timeout => "deadline exceeded".to_string(),
        CircuitBreakerError::CallFailed(e) => e.to_string(),
    }
}
