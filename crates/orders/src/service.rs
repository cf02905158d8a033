use cache::CacheAside;
use chrono::Utc;
use common::config::CacheTtlConfig;
use common::Deadline;
use domain::{parse_uuid, Order, OrderPatch, OrderStats, Result, ServiceError, StoreKind};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::slot::RepositorySlot;
use crate::store::OrderStore;
use crate::OrderStoreError;

pub const ORDER_STATISTICS_KEY: &str = "order:statistics";

pub fn order_key(id: Uuid) -> String {
    format!("order:{}", id)
}

pub fn user_orders_key(user_id: Uuid) -> String {
    format!("user_orders:{}", user_id)
}

/// Order reads through the cache, writes straight to the relational store.
///
/// Every write drops the order's own entry, its owner's order list and the
/// statistics entry, so a caller always reads its own writes.
#[derive(Clone)]
pub struct OrderService {
    orders: RepositorySlot<dyn OrderStore>,
    cache: CacheAside,
    order_ttl: Duration,
    user_orders_ttl: Duration,
    statistics_ttl: Duration,
}

impl OrderService {
    pub fn new(orders: RepositorySlot<dyn OrderStore>, cache: CacheAside, ttl: &CacheTtlConfig) -> Self {
        Self {
            orders,
            cache,
            order_ttl: ttl.order(),
            user_orders_ttl: ttl.user_orders(),
            statistics_ttl: ttl.order_statistics(),
        }
    }

    /// Pending order carrying only a total
    pub async fn create(&self, deadline: Deadline, user_id: &str, total_price: Decimal) -> Result<Order> {
        let store = self.orders.get()?;
        let user_id = parse_uuid(user_id)?;
        if total_price < Decimal::ZERO {
            return Err(ServiceError::Validation("Total price cannot be negative".to_string()));
        }

        self.persist(&*store, deadline, Order::pending(user_id, total_price)).await
    }

    /// Persist an order built by the caller, e.g. from priced cart lines
    pub async fn place(&self, deadline: Deadline, order: Order) -> Result<Order> {
        let store = self.orders.get()?;
        self.persist(&*store, deadline, order).await
    }

    pub async fn get_by_id(&self, deadline: Deadline, id: &str) -> Result<Order> {
        let store = self.orders.get()?;
        let id = parse_uuid(id)?;
        let key = order_key(id);

        if let Some(order) = self.cache.get::<Order>(deadline, &key).await {
            return Ok(order);
        }

        let order = store
            .find_by_id(deadline, id)
            .await
            .map_err(|e| store_error("find_by_id", e))?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;

        self.cache.put(deadline, &key, &order, self.order_ttl).await;
        Ok(order)
    }

    /// Uncached listing of every order
    pub async fn get_all(&self, deadline: Deadline) -> Result<Vec<Order>> {
        let store = self.orders.get()?;
        store
            .find_all(deadline)
            .await
            .map_err(|e| store_error("find_all", e))
    }

    pub async fn get_by_user(&self, deadline: Deadline, user_id: &str) -> Result<Vec<Order>> {
        let store = self.orders.get()?;
        let user_id = parse_uuid(user_id)?;
        let key = user_orders_key(user_id);

        if let Some(orders) = self.cache.get::<Vec<Order>>(deadline, &key).await {
            return Ok(orders);
        }

        let orders = store
            .find_by_user(deadline, user_id)
            .await
            .map_err(|e| store_error("find_by_user", e))?;

        self.cache.put(deadline, &key, &orders, self.user_orders_ttl).await;
        Ok(orders)
    }

    pub async fn get_statistics(&self, deadline: Deadline) -> Result<OrderStats> {
        let store = self.orders.get()?;

        if let Some(stats) = self.cache.get::<OrderStats>(deadline, ORDER_STATISTICS_KEY).await {
            return Ok(stats);
        }

        let stats = store
            .statistics(deadline)
            .await
            .map_err(|e| store_error("statistics", e))?;

        self.cache
            .put(deadline, ORDER_STATISTICS_KEY, &stats, self.statistics_ttl)
            .await;
        Ok(stats)
    }

    pub async fn update(&self, deadline: Deadline, id: &str, patch: OrderPatch) -> Result<Order> {
        let store = self.orders.get()?;
        let id = parse_uuid(id)?;

        let order = store
            .update_status(deadline, id, patch.status, Utc::now())
            .await
            .map_err(|e| store_error("update_status", e))?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;

        self.invalidate(order.id, Some(order.user_id)).await;
        info!(order_id = %order.id, status = %order.status, "Order updated");
        Ok(order)
    }

    /// Delete without checking the order existed
    pub async fn delete(&self, deadline: Deadline, id: &str) -> Result<()> {
        let store = self.orders.get()?;
        let id = parse_uuid(id)?;

        let owner = store
            .delete(deadline, id)
            .await
            .map_err(|e| store_error("delete", e))?;

        self.invalidate(id, owner).await;
        info!(order_id = %id, existed = owner.is_some(), "Order deleted");
        Ok(())
    }

    async fn persist(&self, store: &dyn OrderStore, deadline: Deadline, order: Order) -> Result<Order> {
        store.insert(deadline, &order).await.map_err(|e| match e {
            OrderStoreError::MissingReference => ServiceError::not_found("User", order.user_id),
            other => store_error("insert", other),
        })?;

        self.invalidate(order.id, Some(order.user_id)).await;
        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total_price = %order.total_price,
            lines = order.items.len(),
            "Order created"
        );
        Ok(order)
    }

    async fn invalidate(&self, id: Uuid, owner: Option<Uuid>) {
        let mut keys = vec![order_key(id), ORDER_STATISTICS_KEY.to_string()];
        if let Some(user_id) = owner {
            keys.push(user_orders_key(user_id));
        }
        self.cache.invalidate_all(keys).await;
    }
}

fn store_error(operation: &str, e: OrderStoreError) -> ServiceError {
    match e {
        OrderStoreError::DuplicateKey => ServiceError::AlreadyExists {
            entity: "Order",
            field: "id",
        },
        other => {
            error!(operation, error = %other, "Order store call failed");
            ServiceError::StoreUnavailable(StoreKind::Orders)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockOrderStore;
    use cache::MemoryCache;
    use common::{CircuitBreaker, CircuitBreakerConfig};
    use domain::OrderStatus;
    use mockall::predicate::{always, eq};
    use std::sync::Arc;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn cache() -> (CacheAside, MemoryCache) {
        let backend = MemoryCache::new();
        let breaker = Arc::new(CircuitBreaker::new("order-cache", CircuitBreakerConfig::default()));
        (
            CacheAside::new(Arc::new(backend.clone()), breaker, "order"),
            backend,
        )
    }

    fn service(store: MockOrderStore) -> (OrderService, MemoryCache) {
        let (cache, backend) = cache();
        let slot = RepositorySlot::filled("order", Arc::new(store) as Arc<dyn OrderStore>);
        (
            OrderService::new(slot, cache, &CacheTtlConfig::default()),
            backend,
        )
    }

    #[tokio::test]
    async fn test_uninstalled_store_fails_before_anything_else() {
        let (cache, _) = cache();
        let service = OrderService::new(RepositorySlot::empty("order"), cache, &CacheTtlConfig::default());

        let err = service
            .create(deadline(), &Uuid::new_v4().to_string(), Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RepositoryUninitialized("order")));

        // the slot is checked before the id is even parsed
        let err = service.delete(deadline(), "garbage").await.unwrap_err();
        assert!(matches!(err, ServiceError::RepositoryUninitialized(_)));
    }

    #[tokio::test]
    async fn test_create_persists_pending_order() {
        let user_id = Uuid::new_v4();
        let mut store = MockOrderStore::new();
        store
            .expect_insert()
            .withf(move |_, order| {
                order.user_id == user_id
                    && order.status == OrderStatus::Pending
                    && order.total_price == Decimal::new(4200, 2)
                    && order.items.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let (service, _) = service(store);
        let order = service
            .create(deadline(), &user_id.to_string(), Decimal::new(4200, 2))
            .await
            .unwrap();
        assert_eq!(order.created_at, order.updated_at);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let mut store = MockOrderStore::new();
        store.expect_insert().never();

        let (service, _) = service(store);
        let err = service.create(deadline(), "user-1", Decimal::ONE).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidIdentifier(_)));

        let err = service
            .create(deadline(), &Uuid::new_v4().to_string(), Decimal::new(-1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_by_id_is_cached() {
        let order = Order::pending(Uuid::new_v4(), Decimal::new(1000, 2));
        let id = order.id;
        let returned = order.clone();

        let mut store = MockOrderStore::new();
        store
            .expect_find_by_id()
            .with(always(), eq(id))
            .times(1)
            .returning(move |_, _| Ok(Some(returned.clone())));

        let (service, backend) = service(store);
        assert_eq!(service.get_by_id(deadline(), &id.to_string()).await.unwrap(), order);
        assert!(backend.contains(&order_key(id)).await);
        assert_eq!(service.get_by_id(deadline(), &id.to_string()).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_update_missing_order_is_not_found() {
        let mut store = MockOrderStore::new();
        store.expect_update_status().returning(|_, _, _, _| Ok(None));

        let (service, _) = service(store);
        let err = service
            .update(
                deadline(),
                &Uuid::new_v4().to_string(),
                OrderPatch {
                    status: OrderStatus::Shipped,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_of_absent_order_succeeds() {
        let mut store = MockOrderStore::new();
        store.expect_find_by_id().never();
        store.expect_delete().times(1).returning(|_, _| Ok(None));

        let (service, _) = service(store);
        tokio_test::assert_ok!(service.delete(deadline(), &Uuid::new_v4().to_string()).await);
    }

    #[tokio::test]
    async fn test_store_errors_are_opaque() {
        let mut store = MockOrderStore::new();
        store
            .expect_statistics()
            .returning(|_| Err(OrderStoreError::CorruptRecord("order 1 has status ?".to_string())));

        let (service, _) = service(store);
        let err = service.get_statistics(deadline()).await.unwrap_err();
        assert!(matches!(err, ServiceError::StoreUnavailable(StoreKind::Orders)));
        assert!(!err.to_string().contains("status"));
    }
}
