use async_trait::async_trait;
use common::Deadline;
use domain::{DocumentId, Product, ProductDraft, ProductRef};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::CatalogStore;
use crate::CatalogStoreError;

/// In-memory catalog for tests and local wiring.
///
/// Counts lookups so tests can tell a cache hit from a store read.
#[derive(Clone, Default)]
pub struct MemoryCatalogStore {
    products: Arc<RwLock<BTreeMap<DocumentId, Product>>>,
    reads: Arc<AtomicUsize>,
    external_reads: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of single-product and listing lookups served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of lookups that went through the external id index
    pub fn external_reads(&self) -> usize {
        self.external_reads.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self, deadline: Deadline) -> Result<(), CatalogStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogStoreError::Unavailable);
        }
        if deadline.is_expired() {
            return Err(CatalogStoreError::Timeout);
        }
        Ok(())
    }

    fn resolve(products: &BTreeMap<DocumentId, Product>, id: &ProductRef) -> Option<DocumentId> {
        match id {
            ProductRef::Document(doc_id) => products.contains_key(doc_id).then(|| doc_id.clone()),
            ProductRef::External(uuid) => products
                .values()
                .find(|p| p.external_id == *uuid)
                .map(|p| p.id.clone()),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn insert(&self, deadline: Deadline, product: &Product) -> Result<(), CatalogStoreError> {
        self.check(deadline)?;
        let mut products = self.products.write().await;

        let clash = products.contains_key(&product.id)
            || products.values().any(|p| p.external_id == product.external_id);
        if clash {
            return Err(CatalogStoreError::DuplicateKey);
        }

        products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        deadline: Deadline,
        id: &DocumentId,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.check(deadline)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn find_by_external_id(
        &self,
        deadline: Deadline,
        external_id: Uuid,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.check(deadline)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.external_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .products
            .read()
            .await
            .values()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<Product>, CatalogStoreError> {
        self.check(deadline)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.read().await.values().cloned().collect())
    }

    async fn update(
        &self,
        deadline: Deadline,
        id: &ProductRef,
        draft: &ProductDraft,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.check(deadline)?;
        let mut products = self.products.write().await;
        let Some(key) = Self::resolve(&products, id) else {
            return Ok(None);
        };

        Ok(products.get_mut(&key).map(|product| {
            product.apply(draft.clone());
            product.clone()
        }))
    }

    async fn delete(
        &self,
        deadline: Deadline,
        id: &ProductRef,
    ) -> Result<Option<Product>, CatalogStoreError> {
        self.check(deadline)?;
        let mut products = self.products.write().await;
        Ok(Self::resolve(&products, id).and_then(|key| products.remove(&key)))
    }
}
