use async_trait::async_trait;
use cache::{CacheAside, MemoryCache};
use catalog::{CatalogService, CatalogStore, CatalogStoreError, MemoryCatalogStore};
use common::config::CacheTtlConfig;
use common::{CircuitBreaker, CircuitBreakerConfig, Deadline};
use domain::{DocumentId, Product, ProductDraft, ProductRef, ServiceError};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn draft(name: &str, price: Decimal) -> ProductDraft {
    ProductDraft {
        name: name.to_string(),
        description: format!("{name} description"),
        price,
        stock: 10,
    }
}

fn setup_with(store: Arc<dyn CatalogStore>) -> (CatalogService, MemoryCache) {
    let backend = MemoryCache::new();
    let breaker = Arc::new(CircuitBreaker::new("catalog-it", CircuitBreakerConfig::default()));
    let cache = CacheAside::new(Arc::new(backend.clone()), breaker, "product");
    let service = CatalogService::new(store, cache, &CacheTtlConfig::default());
    (service, backend)
}

fn setup() -> (CatalogService, MemoryCatalogStore, MemoryCache) {
    let store = MemoryCatalogStore::new();
    let (service, backend) = setup_with(Arc::new(store.clone()));
    (service, store, backend)
}

/// Commits updates, then stalls until the caller's deadline has passed
struct SlowCommitStore(MemoryCatalogStore);

#[async_trait]
impl CatalogStore for SlowCommitStore {
    async fn insert(&self, deadline: Deadline, product: &Product) -> Result<(), CatalogStoreError> {
        self.0.insert(deadline, product).await
    }

    async fn find_by_id(
        &self,
        deadline: Deadline,
        id: &DocumentId,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.0.find_by_id(deadline, id).await
    }

    async fn find_by_external_id(
        &self,
        deadline: Deadline,
        external_id: Uuid,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.0.find_by_external_id(deadline, external_id).await
    }

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<Product>, CatalogStoreError> {
        self.0.find_all(deadline).await
    }

    async fn update(
        &self,
        deadline: Deadline,
        id: &ProductRef,
        draft: &ProductDraft,
    ) -> Result<Option<Product>, CatalogStoreError> {
        let updated = self.0.update(deadline, id, draft).await;
        tokio::time::sleep_until(deadline.instant()).await;
        updated
    }

    async fn delete(
        &self,
        deadline: Deadline,
        id: &ProductRef,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.0.delete(deadline, id).await
    }
}

#[tokio::test]
async fn test_update_is_visible_under_both_identifier_forms() {
    let (service, _, _) = setup();
    let product = service
        .create(deadline(), draft("Kettle", Decimal::new(3000, 2)))
        .await
        .unwrap();
    let doc_id = product.id.to_string();
    let external_id = product.external_id.to_string();

    // warm both cache entries
    service.get_by_id(deadline(), &doc_id).await.unwrap();
    service.get_by_id(deadline(), &external_id).await.unwrap();

    service
        .update(deadline(), &external_id, draft("Kettle v2", Decimal::new(3500, 2)))
        .await
        .unwrap();

    let by_doc = service.get_by_id(deadline(), &doc_id).await.unwrap();
    let by_uuid = service.get_by_id(deadline(), &external_id).await.unwrap();
    assert_eq!(by_doc.name, "Kettle v2");
    assert_eq!(by_uuid.price, Decimal::new(3500, 2));
    assert_eq!(by_doc.id, product.id);
}

#[tokio::test]
async fn test_reads_are_cached_until_a_write() {
    let (service, store, _) = setup();
    let product = service
        .create(deadline(), draft("Mug", Decimal::new(800, 2)))
        .await
        .unwrap();

    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert_eq!(store.reads(), 1);

    assert_eq!(service.get_all(deadline()).await.unwrap().len(), 1);
    service
        .create(deadline(), draft("Saucer", Decimal::new(400, 2)))
        .await
        .unwrap();
    assert_eq!(service.get_all(deadline()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_lookup_by_uuid_goes_through_the_secondary_index() {
    let (service, store, _) = setup();
    let product = service
        .create(deadline(), draft("Filter", Decimal::new(150, 2)))
        .await
        .unwrap();

    let price = service
        .get_price(deadline(), &product.external_id.to_string())
        .await
        .unwrap();
    assert_eq!(price, Decimal::new(150, 2));
    assert_eq!(store.external_reads(), 1);
}

#[tokio::test]
async fn test_delete_invalidates_and_then_not_found() {
    let (service, _, backend) = setup();
    let product = service
        .create(deadline(), draft("Scale", Decimal::new(2200, 2)))
        .await
        .unwrap();
    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert!(backend.contains(&format!("product:{}", product.id)).await);

    service.delete(deadline(), product.id.as_str()).await.unwrap();
    assert!(!backend.contains(&format!("product:{}", product.id)).await);

    let err = service.get_by_id(deadline(), product.id.as_str()).await.unwrap_err();
    assert!(err.is_not_found());
    let err = service.delete(deadline(), product.id.as_str()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reads_survive_a_dead_cache() {
    let (service, _, backend) = setup();
    let product = service
        .create(deadline(), draft("Tamper", Decimal::new(1900, 2)))
        .await
        .unwrap();

    backend.set_unavailable(true);

    let found = service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert_eq!(found, product);
    assert_eq!(service.get_all(deadline()).await.unwrap(), vec![product.clone()]);

    // writes still land in the store
    let updated = service
        .update(deadline(), product.id.as_str(), draft("Tamper", Decimal::new(2100, 2)))
        .await
        .unwrap();
    assert_eq!(updated.price, Decimal::new(2100, 2));
}

#[tokio::test]
async fn test_dead_store_is_unavailable() {
    let (service, store, _) = setup();
    store.set_unavailable(true);

    let err = service.get_all(deadline()).await.unwrap_err();
    assert!(matches!(err, ServiceError::StoreUnavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn test_update_that_spends_the_deadline_still_invalidates() {
    let (service, _) = setup_with(Arc::new(SlowCommitStore(MemoryCatalogStore::new())));
    let product = service
        .create(deadline(), draft("Kettle", Decimal::new(3000, 2)))
        .await
        .unwrap();
    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();

    let tight = Deadline::after(Duration::from_millis(200));
    service
        .update(tight, product.id.as_str(), draft("Kettle v2", Decimal::new(3500, 2)))
        .await
        .unwrap();
    assert!(tight.is_expired());

    let found = service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert_eq!(found.name, "Kettle v2");
    assert_eq!(
        service.get_price(deadline(), product.id.as_str()).await.unwrap(),
        Decimal::new(3500, 2)
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_requests_do_not_block_later_invalidation() {
    let (service, _, _) = setup();
    let product = service
        .create(deadline(), draft("Kettle", Decimal::new(3000, 2)))
        .await
        .unwrap();
    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();

    for _ in 0..5 {
        let _ = service
            .get_by_id(Deadline::after(Duration::ZERO), product.id.as_str())
            .await;
    }

    service
        .update(deadline(), product.id.as_str(), draft("Kettle v2", Decimal::new(3500, 2)))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;

    let found = service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert_eq!(found.name, "Kettle v2");
}

#[tokio::test(start_paused = true)]
async fn test_update_during_open_circuit_is_not_served_stale_after_recovery() {
    let (service, _, backend) = setup();
    let product = service
        .create(deadline(), draft("Kettle", Decimal::new(3000, 2)))
        .await
        .unwrap();
    service.get_by_id(deadline(), product.id.as_str()).await.unwrap();

    // cache outage long enough to open the circuit
    backend.set_unavailable(true);
    for _ in 0..3 {
        service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    }
    backend.set_unavailable(false);

    service
        .update(deadline(), product.id.as_str(), draft("Kettle v2", Decimal::new(3500, 2)))
        .await
        .unwrap();
    assert!(!backend.contains(&format!("product:{}", product.id)).await);

    tokio::time::advance(Duration::from_secs(31)).await;
    let found = service.get_by_id(deadline(), product.id.as_str()).await.unwrap();
    assert_eq!(found.name, "Kettle v2");
}
