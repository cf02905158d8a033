use cache::{CacheError, MappingStore};
use common::Deadline;
use domain::{Cart, ProductRef, Result, ServiceError, StoreKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub fn cart_key(user_id: Uuid) -> String {
    format!("cart:{}", user_id)
}

/// Per-user quantity ledger held in the cache's mapping store.
///
/// The cache is the only copy of a cart, so unlike cache-aside reads a
/// failure here is reported to the caller.
#[derive(Clone)]
pub struct CartStore {
    mapping: Arc<dyn MappingStore>,
    ttl: Duration,
}

impl CartStore {
    pub fn new(mapping: Arc<dyn MappingStore>, ttl: Duration) -> Self {
        Self { mapping, ttl }
    }

    /// Increment the line by `quantity` and refresh the cart TTL in one step.
    /// Returns the new quantity of the line.
    ///
    /// An add that would push the line past `u32::MAX` is refused and leaves
    /// the cart unchanged.
    pub async fn add(
        &self,
        deadline: Deadline,
        user_id: Uuid,
        product: &ProductRef,
        quantity: u32,
    ) -> Result<u32> {
        if quantity == 0 {
            return Err(ServiceError::Validation("Quantity must be at least 1".to_string()));
        }

        let total = self
            .mapping
            .increment_with_ttl(
                deadline,
                &cart_key(user_id),
                &product.to_string(),
                i64::from(quantity),
                i64::from(u32::MAX),
                self.ttl,
            )
            .await
            .map_err(|e| cart_error("increment_with_ttl", e))?
            .ok_or_else(|| {
                warn!(user_id = %user_id, product_id = %product, quantity, "Cart line would overflow");
                ServiceError::Validation(format!(
                    "Quantity of {} cannot exceed {}",
                    product,
                    u32::MAX
                ))
            })?;

        debug!(user_id = %user_id, product_id = %product, quantity = total, "Cart line incremented");
        u32::try_from(total)
            .map_err(|_| ServiceError::Validation(format!("Quantity out of range: {}", total)))
    }

    /// Drop one line; a missing line is not an error
    pub async fn remove(&self, deadline: Deadline, user_id: Uuid, product: &ProductRef) -> Result<()> {
        self.mapping
            .field_delete(deadline, &cart_key(user_id), &product.to_string())
            .await
            .map_err(|e| cart_error("field_delete", e))
    }

    pub async fn get(&self, deadline: Deadline, user_id: Uuid) -> Result<Cart> {
        let fields = self
            .mapping
            .get_all(deadline, &cart_key(user_id))
            .await
            .map_err(|e| cart_error("get_all", e))?;

        let mut cart = Cart::new();
        for (product_id, raw) in fields {
            match raw.parse::<u32>() {
                Ok(0) => {}
                Ok(quantity) => {
                    cart.insert(product_id, quantity);
                }
                Err(_) => {
                    error!(user_id = %user_id, product_id = %product_id, value = %raw, "Unreadable cart line");
                    return Err(ServiceError::Validation(format!(
                        "Cart line {} holds an unreadable quantity; remove it and add it again",
                        product_id
                    )));
                }
            }
        }
        Ok(cart)
    }

    pub async fn clear(&self, deadline: Deadline, user_id: Uuid) -> Result<()> {
        self.mapping
            .delete(deadline, &cart_key(user_id))
            .await
            .map_err(|e| cart_error("delete", e))
    }
}

fn cart_error(operation: &str, e: CacheError) -> ServiceError {
    error!(operation, error = %e, "Cart store call failed");
    ServiceError::StoreUnavailable(StoreKind::Cart)
}
