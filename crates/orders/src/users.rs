use cache::CacheAside;
use common::config::CacheTtlConfig;
use common::Deadline;
use domain::{parse_uuid, NewUser, Result, ServiceError, StoreKind, User, UserUpdate};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::slot::RepositorySlot;
use crate::store::UserStore;
use crate::OrderStoreError;

pub fn user_key(id: Uuid) -> String {
    format!("user:{}", id)
}

/// User records; single-user reads go through the cache
#[derive(Clone)]
pub struct UserService {
    users: RepositorySlot<dyn UserStore>,
    cache: CacheAside,
    user_ttl: Duration,
}

impl UserService {
    pub fn new(users: RepositorySlot<dyn UserStore>, cache: CacheAside, ttl: &CacheTtlConfig) -> Self {
        Self {
            users,
            cache,
            user_ttl: ttl.user(),
        }
    }

    /// Create a user. The email must not be taken.
    pub async fn register(&self, deadline: Deadline, new_user: NewUser) -> Result<User> {
        let store = self.users.get()?;
        new_user.validate()?;

        let existing = store
            .find_by_email(deadline, &new_user.email)
            .await
            .map_err(|e| store_error("find_by_email", e))?;
        if existing.is_some() {
            return Err(email_taken());
        }

        let user = new_user.into_user();
        store
            .insert(deadline, &user)
            .await
            .map_err(|e| store_error("insert", e))?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get_by_id(&self, deadline: Deadline, id: &str) -> Result<User> {
        let store = self.users.get()?;
        let id = parse_uuid(id)?;
        let key = user_key(id);

        if let Some(user) = self.cache.get::<User>(deadline, &key).await {
            return Ok(user);
        }

        let user = store
            .find_by_id(deadline, id)
            .await
            .map_err(|e| store_error("find_by_id", e))?
            .ok_or_else(|| ServiceError::not_found("User", id))?;

        self.cache.put(deadline, &key, &user, self.user_ttl).await;
        Ok(user)
    }

    pub async fn get_all(&self, deadline: Deadline) -> Result<Vec<User>> {
        let store = self.users.get()?;
        store
            .find_all(deadline)
            .await
            .map_err(|e| store_error("find_all", e))
    }

    pub async fn update(&self, deadline: Deadline, id: &str, update: UserUpdate) -> Result<User> {
        let store = self.users.get()?;
        let id = parse_uuid(id)?;
        update.validate()?;

        let user = store
            .update(deadline, id, &update)
            .await
            .map_err(|e| store_error("update", e))?
            .ok_or_else(|| ServiceError::not_found("User", id))?;

        self.cache.invalidate(&user_key(id)).await;
        info!(user_id = %id, "User updated");
        Ok(user)
    }

    /// Delete without checking the user existed
    pub async fn delete(&self, deadline: Deadline, id: &str) -> Result<()> {
        let store = self.users.get()?;
        let id = parse_uuid(id)?;

        store
            .delete(deadline, id)
            .await
            .map_err(|e| store_error("delete", e))?;

        self.cache.invalidate(&user_key(id)).await;
        info!(user_id = %id, "User deleted");
        Ok(())
    }
}

fn email_taken() -> ServiceError {
    ServiceError::AlreadyExists {
        entity: "User",
        field: "email",
    }
}

fn store_error(operation: &str, e: OrderStoreError) -> ServiceError {
    match e {
        // ids are generated here, so a clash can only be the email index
        OrderStoreError::DuplicateKey => email_taken(),
        // orders still reference the user
        OrderStoreError::MissingReference => {
            ServiceError::Validation("User still has orders and cannot be deleted".to_string())
        }
        other => {
            error!(operation, error = %other, "User store call failed");
            ServiceError::StoreUnavailable(StoreKind::Users)
        }
    }
}
