use cache::LeaseStore;
use common::Deadline;
use domain::{Result, ServiceError, StoreKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Budget for releasing a lease, independent of the request deadline so a
/// timed-out checkout still frees the user
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

pub fn lease_key(user_id: Uuid) -> String {
    format!("checkout_lease:{}", user_id)
}

/// Proof of holding a user's checkout lease
#[derive(Debug)]
pub struct LeaseToken {
    user_id: Uuid,
    key: String,
    token: String,
}

impl LeaseToken {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

/// At most one checkout per user at a time.
///
/// The lease expires on its own after `ttl`, so a crashed holder blocks the
/// user for at most that long.
#[derive(Clone)]
pub struct CheckoutLease {
    leases: Arc<dyn LeaseStore>,
    ttl: Duration,
}

impl CheckoutLease {
    pub fn new(leases: Arc<dyn LeaseStore>, ttl: Duration) -> Self {
        Self { leases, ttl }
    }

    /// Take the lease or fail with `CheckoutInProgress`
    pub async fn acquire(&self, deadline: Deadline, user_id: Uuid) -> Result<LeaseToken> {
        let key = lease_key(user_id);
        let token = Uuid::new_v4().to_string();

        let acquired = self
            .leases
            .try_acquire(deadline, &key, &token, self.ttl)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "Failed to acquire checkout lease");
                ServiceError::StoreUnavailable(StoreKind::Cart)
            })?;

        if !acquired {
            warn!(user_id = %user_id, "Checkout already in progress");
            return Err(ServiceError::CheckoutInProgress(user_id));
        }

        debug!(user_id = %user_id, "Checkout lease acquired");
        Ok(LeaseToken {
            user_id,
            key,
            token,
        })
    }

    /// Give the lease back. Failures are logged; the TTL cleans up.
    pub async fn release(&self, lease: LeaseToken) {
        let deadline = Deadline::after(RELEASE_TIMEOUT);
        match self.leases.release(deadline, &lease.key, &lease.token).await {
            Ok(true) => debug!(user_id = %lease.user_id, "Checkout lease released"),
            Ok(false) => warn!(user_id = %lease.user_id, "Checkout lease had already expired"),
            Err(e) => error!(user_id = %lease.user_id, error = %e, "Failed to release checkout lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::MemoryCache;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_second_acquire_is_contended() {
        let lease = CheckoutLease::new(Arc::new(MemoryCache::new()), Duration::from_secs(30));
        let user = Uuid::new_v4();

        let held = lease.acquire(deadline(), user).await.unwrap();
        assert_eq!(held.user_id(), user);

        let err = lease.acquire(deadline(), user).await.unwrap_err();
        assert!(matches!(err, ServiceError::CheckoutInProgress(u) if u == user));

        // other users are independent
        tokio_test::assert_ok!(lease.acquire(deadline(), Uuid::new_v4()).await);

        lease.release(held).await;
        tokio_test::assert_ok!(lease.acquire(deadline(), user).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_lease_expires() {
        let lease = CheckoutLease::new(Arc::new(MemoryCache::new()), Duration::from_secs(30));
        let user = Uuid::new_v4();

        let _abandoned = lease.acquire(deadline(), user).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio_test::assert_ok!(lease.acquire(deadline(), user).await);
    }

    #[tokio::test]
    async fn test_release_failure_is_swallowed() {
        let backend = MemoryCache::new();
        let lease = CheckoutLease::new(Arc::new(backend.clone()), Duration::from_secs(30));
        let held = lease.acquire(deadline(), Uuid::new_v4()).await.unwrap();

        backend.fail_deletes(true);
        lease.release(held).await;
    }
}
