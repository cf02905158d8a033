use cache::CacheAside;
use common::config::CacheTtlConfig;
use common::Deadline;
use domain::{Product, ProductDraft, ProductRef, Result, ServiceError, StoreKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use validator::Validate;

use crate::store::CatalogStore;
use crate::CatalogStoreError;

pub const PRODUCT_LIST_KEY: &str = "products:all";

/// Cache-aside reads and write-then-invalidate over the catalog store
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: CacheAside,
    product_ttl: Duration,
    list_ttl: Duration,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: CacheAside, ttl: &CacheTtlConfig) -> Self {
        Self {
            store,
            cache,
            product_ttl: ttl.product(),
            list_ttl: ttl.product_list(),
        }
    }

    /// Persist a new product. The cache is not pre-populated.
    pub async fn create(&self, deadline: Deadline, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        let product = Product::from_draft(draft);

        self.store
            .insert(deadline, &product)
            .await
            .map_err(|e| store_error("insert", e))?;

        self.cache.invalidate(PRODUCT_LIST_KEY).await;
        info!(product_id = %product.id, external_id = %product.external_id, "Product created");
        Ok(product)
    }

    /// Look up by document id or external UUID
    pub async fn get_by_id(&self, deadline: Deadline, id: &str) -> Result<Product> {
        let product_ref = ProductRef::parse(id)?;
        let key = product_ref.cache_key();

        if let Some(product) = self.cache.get::<Product>(deadline, &key).await {
            return Ok(product);
        }

        let found = match &product_ref {
            ProductRef::Document(doc_id) => self.store.find_by_id(deadline, doc_id).await,
            ProductRef::External(uuid) => self.store.find_by_external_id(deadline, *uuid).await,
        }
        .map_err(|e| store_error("find", e))?;

        let product = found.ok_or_else(|| ServiceError::not_found("Product", &product_ref))?;
        self.cache.put(deadline, &key, &product, self.product_ttl).await;
        Ok(product)
    }

    pub async fn get_all(&self, deadline: Deadline) -> Result<Vec<Product>> {
        if let Some(products) = self.cache.get::<Vec<Product>>(deadline, PRODUCT_LIST_KEY).await {
            return Ok(products);
        }

        let products = self
            .store
            .find_all(deadline)
            .await
            .map_err(|e| store_error("find_all", e))?;

        self.cache
            .put(deadline, PRODUCT_LIST_KEY, &products, self.list_ttl)
            .await;
        Ok(products)
    }

    /// Replace the mutable fields, then drop every cache entry naming the product
    pub async fn update(&self, deadline: Deadline, id: &str, draft: ProductDraft) -> Result<Product> {
        let product_ref = ProductRef::parse(id)?;
        draft.validate()?;

        let product = self
            .store
            .update(deadline, &product_ref, &draft)
            .await
            .map_err(|e| store_error("update", e))?
            .ok_or_else(|| ServiceError::not_found("Product", &product_ref))?;

        self.invalidate(&product).await;
        info!(product_id = %product.id, "Product updated");
        Ok(product)
    }

    pub async fn delete(&self, deadline: Deadline, id: &str) -> Result<()> {
        let product_ref = ProductRef::parse(id)?;

        let product = self
            .store
            .delete(deadline, &product_ref)
            .await
            .map_err(|e| store_error("delete", e))?
            .ok_or_else(|| ServiceError::not_found("Product", &product_ref))?;

        self.invalidate(&product).await;
        info!(product_id = %product.id, "Product deleted");
        Ok(())
    }

    /// Current unit price, resolved exactly like `get_by_id`
    pub async fn get_price(&self, deadline: Deadline, id: &str) -> Result<Decimal> {
        Ok(self.get_by_id(deadline, id).await?.price)
    }

    async fn invalidate(&self, product: &Product) {
        let mut keys: Vec<String> = product.refs().iter().map(ProductRef::cache_key).collect();
        keys.push(PRODUCT_LIST_KEY.to_string());
        self.cache.invalidate_all(keys).await;
    }
}

fn store_error(operation: &str, e: CatalogStoreError) -> ServiceError {
    match e {
        CatalogStoreError::DuplicateKey => ServiceError::AlreadyExists {
            entity: "Product",
            field: "id",
        },
        other => {
            error!(operation, error = %other, "Catalog store call failed");
            ServiceError::StoreUnavailable(StoreKind::Catalog)
        }
    }
}
