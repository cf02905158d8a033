use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Deadline;
use domain::{Order, OrderStats, OrderStatus, User, UserUpdate};
use uuid::Uuid;

use crate::OrderStoreError;

/// Orders in the relational store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, deadline: Deadline, order: &Order) -> Result<(), OrderStoreError>;

    async fn find_by_id(&self, deadline: Deadline, id: Uuid) -> Result<Option<Order>, OrderStoreError>;

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<Order>, OrderStoreError>;

    async fn find_by_user(&self, deadline: Deadline, user_id: Uuid) -> Result<Vec<Order>, OrderStoreError>;

    /// Set status and `updated_at` in a single update-and-return statement
    async fn update_status(
        &self,
        deadline: Deadline,
        id: Uuid,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderStoreError>;

    /// Remove the row if present. Returns the owner of the removed order.
    async fn delete(&self, deadline: Deadline, id: Uuid) -> Result<Option<Uuid>, OrderStoreError>;

    /// Aggregate over every stored order
    async fn statistics(&self, deadline: Deadline) -> Result<OrderStats, OrderStoreError>;
}

/// Users in the relational store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// A clash on id or email is `DuplicateKey`
    async fn insert(&self, deadline: Deadline, user: &User) -> Result<(), OrderStoreError>;

    async fn find_by_id(&self, deadline: Deadline, id: Uuid) -> Result<Option<User>, OrderStoreError>;

    async fn find_by_email(&self, deadline: Deadline, email: &str) -> Result<Option<User>, OrderStoreError>;

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<User>, OrderStoreError>;

    async fn update(
        &self,
        deadline: Deadline,
        id: Uuid,
        update: &UserUpdate,
    ) -> Result<Option<User>, OrderStoreError>;

    async fn delete(&self, deadline: Deadline, id: Uuid) -> Result<(), OrderStoreError>;
}
