use async_trait::async_trait;
use common::Deadline;
use std::collections::HashMap;
use std::time::Duration;

use crate::CacheError;

/// Blob cache keyed by string with a per-key TTL.
///
/// Holds serialized bytes only; it knows nothing about business types.
/// No guarantee spans more than one key.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, deadline: Deadline, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(
        &self,
        deadline: Deadline,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError>;
}

/// Mapping-valued entries with field-level operations.
///
/// `field_increment` and `increment_with_ttl` must be atomic on the backend
/// so concurrent writers to the same field never lose an update.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn field_get(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, CacheError>;

    async fn field_set(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), CacheError>;

    /// Add `delta` to an integer field (missing counts as 0); returns the new value
    async fn field_increment(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, CacheError>;

    /// Add `delta` to an integer field and refresh the key's TTL as one
    /// atomic step, unless the new value would exceed `ceiling`.
    ///
    /// Returns the new value, or `None` with nothing changed when the
    /// ceiling would be passed.
    async fn increment_with_ttl(
        &self,
        deadline: Deadline,
        key: &str,
        field: &str,
        delta: i64,
        ceiling: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, CacheError>;

    async fn field_delete(&self, deadline: Deadline, key: &str, field: &str) -> Result<(), CacheError>;

    async fn get_all(&self, deadline: Deadline, key: &str) -> Result<HashMap<String, String>, CacheError>;

    async fn delete(&self, deadline: Deadline, key: &str) -> Result<(), CacheError>;

    async fn expire(&self, deadline: Deadline, key: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Short-lived exclusive leases identified by a holder token
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Set `key` to `token` only if absent. Returns whether the lease was taken.
    async fn try_acquire(
        &self,
        deadline: Deadline,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Delete `key` only if it still holds `token`. Returns whether it did.
    async fn release(&self, deadline: Deadline, key: &str, token: &str) -> Result<bool, CacheError>;
}
