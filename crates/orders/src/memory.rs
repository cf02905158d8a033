use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Deadline;
use domain::{Order, OrderStats, OrderStatus, User, UserUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{OrderStore, UserStore};
use crate::OrderStoreError;

#[derive(Default)]
struct Switches {
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl Switches {
    fn check(&self, deadline: Deadline) -> Result<(), OrderStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable);
        }
        if deadline.is_expired() {
            return Err(OrderStoreError::Timeout);
        }
        Ok(())
    }

    fn read(&self, deadline: Deadline) -> Result<(), OrderStoreError> {
        self.check(deadline)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory order table. Inserts whose `user_id` is unknown to the linked
/// user store fail the way a foreign key would.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    users: Option<MemoryUserStore>,
    switches: Arc<Switches>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce that every order references a user held by `users`
    pub fn with_users(users: MemoryUserStore) -> Self {
        Self {
            users: Some(users),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.switches.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of read queries served so far
    pub fn reads(&self) -> usize {
        self.switches.reads.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, deadline: Deadline, order: &Order) -> Result<(), OrderStoreError> {
        self.switches.check(deadline)?;
        if let Some(users) = &self.users {
            if !users.users.read().await.contains_key(&order.user_id) {
                return Err(OrderStoreError::MissingReference);
            }
        }

        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(OrderStoreError::DuplicateKey);
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, deadline: Deadline, id: Uuid) -> Result<Option<Order>, OrderStoreError> {
        self.switches.read(deadline)?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<Order>, OrderStoreError> {
        self.switches.read(deadline)?;
        Ok(newest_first(self.orders.read().await.values().cloned().collect()))
    }

    async fn find_by_user(&self, deadline: Deadline, user_id: Uuid) -> Result<Vec<Order>, OrderStoreError> {
        self.switches.read(deadline)?;
        let orders = self.orders.read().await;
        Ok(newest_first(
            orders
                .values()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn update_status(
        &self,
        deadline: Deadline,
        id: Uuid,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderStoreError> {
        self.switches.check(deadline)?;
        Ok(self.orders.write().await.get_mut(&id).map(|order| {
            order.status = status;
            order.updated_at = updated_at;
            order.clone()
        }))
    }

    async fn delete(&self, deadline: Deadline, id: Uuid) -> Result<Option<Uuid>, OrderStoreError> {
        self.switches.check(deadline)?;
        Ok(self.orders.write().await.remove(&id).map(|o| o.user_id))
    }

    async fn statistics(&self, deadline: Deadline) -> Result<OrderStats, OrderStoreError> {
        self.switches.read(deadline)?;
        let orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        Ok(OrderStats::compute(&orders, Utc::now()))
    }
}

/// In-memory user table with a unique email index
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    switches: Arc<Switches>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.switches.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.switches.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, deadline: Deadline, user: &User) -> Result<(), OrderStoreError> {
        self.switches.check(deadline)?;
        let mut users = self.users.write().await;
        let clash = users.contains_key(&user.id) || users.values().any(|u| u.email == user.email);
        if clash {
            return Err(OrderStoreError::DuplicateKey);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, deadline: Deadline, id: Uuid) -> Result<Option<User>, OrderStoreError> {
        self.switches.read(deadline)?;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, deadline: Deadline, email: &str) -> Result<Option<User>, OrderStoreError> {
        self.switches.read(deadline)?;
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_all(&self, deadline: Deadline) -> Result<Vec<User>, OrderStoreError> {
        self.switches.read(deadline)?;
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update(
        &self,
        deadline: Deadline,
        id: Uuid,
        update: &UserUpdate,
    ) -> Result<Option<User>, OrderStoreError> {
        self.switches.check(deadline)?;
        let mut users = self.users.write().await;
        if users.values().any(|u| u.id != id && u.email == update.email) {
            return Err(OrderStoreError::DuplicateKey);
        }

        Ok(users.get_mut(&id).map(|user| {
            user.username = update.username.clone();
            user.email = update.email.clone();
            user.clone()
        }))
    }

    async fn delete(&self, deadline: Deadline, id: Uuid) -> Result<(), OrderStoreError> {
        self.switches.check(deadline)?;
        self.users.write().await.remove(&id);
        Ok(())
    }
}
