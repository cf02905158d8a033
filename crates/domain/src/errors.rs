use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::Order;

/// Backing store a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Catalog,
    Orders,
    Users,
    Cart,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Catalog => write!(f, "catalog"),
            StoreKind::Orders => write!(f, "orders"),
            StoreKind::Users => write!(f, "users"),
            StoreKind::Cart => write!(f, "cart"),
        }
    }
}

/// The closed set of failures a service operation can report.
///
/// Raw store errors never reach callers; adapters log them and map them to
/// one of these kinds.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} with this {field} already exists")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{0} store unavailable")]
    StoreUnavailable(StoreKind),

    #[error("{0} repository is not initialized")]
    RepositoryUninitialized(&'static str),

    /// The order was persisted but the cart could not be cleared. Retry
    /// the clear only; re-running checkout would place a second order.
    #[error("Order {} was placed but the cart could not be cleared", order.id)]
    SagaPartialFailure { order: Box<Order> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A checkout is already in progress for user {0}")]
    CheckoutInProgress(Uuid),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Validation(errors.to_string())
    }
}
