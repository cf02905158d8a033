pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use memory::MemoryCatalogStore;
pub use postgres::PostgresCatalogStore;
pub use service::CatalogService;
pub use store::CatalogStore;

use common::DeadlineExceeded;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Duplicate product key")]
    DuplicateKey,

    #[error("Catalog store unavailable")]
    Unavailable,

    #[error("Catalog call exceeded its deadline")]
    Timeout,
}

impl From<DeadlineExceeded> for CatalogStoreError {
    fn from(_: DeadlineExceeded) -> Self {
        CatalogStoreError::Timeout
    }
}
