//! Port over the product document store.
//!
//! Adapters resolve both identifier shapes: [`CatalogStore::find_by_id`] goes
//! through the primary document key, [`CatalogStore::find_by_external_id`]
//! through the unique secondary index on the external UUID.

use async_trait::async_trait;
use common::Deadline;
use domain::{DocumentId, Product, ProductDraft, ProductRef};
use uuid::Uuid;

use crate::CatalogStoreError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new document. A clash on either identifier is `DuplicateKey`.
    async fn insert(&self, deadline: Deadline, product: &Product) -> Result<(), CatalogStoreError>;

    async fn find_by_id(
        &self,
        deadline: Deadline,
        id: &DocumentId,
    ) -> Result<Option<Product>, CatalogStoreError>;

    async fn find_by_external_id(
        &self,
        deadline: Deadline,
        external_id: Uuid,
    ) -> Result<Option<Product>, CatalogStoreError>;

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<Product>, CatalogStoreError>;

    /// Replace the mutable fields in one statement and return the new document
    async fn update(
        &self,
        deadline: Deadline,
        id: &ProductRef,
        draft: &ProductDraft,
    ) -> Result<Option<Product>, CatalogStoreError>;

    /// Remove the document, returning what was removed
    async fn delete(
        &self,
        deadline: Deadline,
        id: &ProductRef,
    ) -> Result<Option<Product>, CatalogStoreError>;
}
