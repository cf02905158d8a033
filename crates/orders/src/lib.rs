pub mod memory;
pub mod postgres;
pub mod service;
pub mod slot;
pub mod store;
pub mod users;

pub use memory::{MemoryOrderStore, MemoryUserStore};
pub use postgres::{PostgresOrderStore, PostgresUserStore};
pub use service::OrderService;
pub use slot::RepositorySlot;
pub use store::{OrderStore, UserStore};
pub use users::UserService;

use common::DeadlineExceeded;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Unique constraint violated")]
    DuplicateKey,

    #[error("Foreign key constraint violated")]
    MissingReference,

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Relational store unavailable")]
    Unavailable,

    #[error("Relational store call exceeded its deadline")]
    Timeout,
}

impl From<DeadlineExceeded> for OrderStoreError {
    fn from(_: DeadlineExceeded) -> Self {
        OrderStoreError::Timeout
    }
}
