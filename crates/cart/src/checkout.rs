use catalog::CatalogService;
use common::metrics::{record_checkout, record_checkout_stage_failure};
use common::Deadline;
use domain::{parse_uuid, Cart, CartLine, Order, ProductRef, Result, ServiceError};
use futures_util::future::try_join_all;
use orders::OrderService;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart_store::CartStore;
use crate::lease::CheckoutLease;
use crate::stage::{CheckoutOutcome, CheckoutStage};

/// Cart operations and the checkout saga.
///
/// Checkout spans two stores with no shared transaction. It reads the cart,
/// prices every line through the catalog, persists one order and then clears
/// the cart. Everything before the order write aborts cleanly; a failed clear
/// after it is reported as `SagaPartialFailure` and is retried with
/// [`CartService::clear_cart`] alone.
#[derive(Clone)]
pub struct CartService {
    carts: CartStore,
    lease: CheckoutLease,
    catalog: CatalogService,
    orders: OrderService,
}

impl CartService {
    pub fn new(
        carts: CartStore,
        lease: CheckoutLease,
        catalog: CatalogService,
        orders: OrderService,
    ) -> Self {
        Self {
            carts,
            lease,
            catalog,
            orders,
        }
    }

    /// Add `quantity` of a product; returns the line's new quantity.
    ///
    /// The product id is only checked for shape. Neither existence nor stock
    /// is verified until checkout.
    pub async fn add_to_cart(
        &self,
        deadline: Deadline,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<u32> {
        let user_id = parse_uuid(user_id)?;
        let product = ProductRef::parse(product_id)?;
        self.carts.add(deadline, user_id, &product, quantity).await
    }

    pub async fn remove_from_cart(&self, deadline: Deadline, user_id: &str, product_id: &str) -> Result<()> {
        let user_id = parse_uuid(user_id)?;
        let product = ProductRef::parse(product_id)?;
        self.carts.remove(deadline, user_id, &product).await
    }

    pub async fn get_cart(&self, deadline: Deadline, user_id: &str) -> Result<Cart> {
        self.carts.get(deadline, parse_uuid(user_id)?).await
    }

    pub async fn clear_cart(&self, deadline: Deadline, user_id: &str) -> Result<()> {
        let user_id = parse_uuid(user_id)?;
        self.carts.clear(deadline, user_id).await?;
        info!(user_id = %user_id, "Cart cleared");
        Ok(())
    }

    /// Turn the user's cart into a pending order
    pub async fn checkout(&self, deadline: Deadline, user_id: &str) -> Result<Order> {
        let user_id = parse_uuid(user_id)?;
        let start = Instant::now();

        let lease = match self.lease.acquire(deadline, user_id).await {
            Ok(lease) => lease,
            Err(e) => {
                let outcome = match e {
                    ServiceError::CheckoutInProgress(_) => CheckoutOutcome::Contended,
                    _ => {
                        record_checkout_stage_failure(CheckoutStage::AcquireLease.as_str());
                        CheckoutOutcome::Aborted
                    }
                };
                record_checkout(&outcome.to_string(), start.elapsed().as_secs_f64());
                return Err(e);
            }
        };

        let result = self.run(deadline, user_id).await;
        self.lease.release(lease).await;

        let outcome = match &result {
            Ok(_) => CheckoutOutcome::Completed,
            Err(ServiceError::SagaPartialFailure { .. }) => CheckoutOutcome::Partial,
            Err(_) => CheckoutOutcome::Aborted,
        };
        record_checkout(&outcome.to_string(), start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => info!(
                user_id = %user_id,
                order_id = %order.id,
                total_price = %order.total_price,
                lines = order.items.len(),
                duration_ms = %start.elapsed().as_millis(),
                "Checkout completed"
            ),
            Err(e) => warn!(user_id = %user_id, outcome = %outcome, error = %e, "Checkout did not complete"),
        }
        result
    }

    async fn run(&self, deadline: Deadline, user_id: Uuid) -> Result<Order> {
        let cart = self
            .carts
            .get(deadline, user_id)
            .await
            .map_err(failed_at(CheckoutStage::ReadCart, user_id))?;

        let lines = self
            .price_lines(deadline, &cart)
            .await
            .map_err(failed_at(CheckoutStage::ResolvePrices, user_id))?;

        let order = self
            .orders
            .place(deadline, Order::from_lines(user_id, lines))
            .await
            .map_err(failed_at(CheckoutStage::PersistOrder, user_id))?;

        if let Err(e) = self.carts.clear(deadline, user_id).await {
            failed_at(CheckoutStage::ClearCart, user_id)(e);
            return Err(ServiceError::SagaPartialFailure {
                order: Box::new(order),
            });
        }

        Ok(order)
    }

    /// Price every line concurrently; the first failure wins
    async fn price_lines(&self, deadline: Deadline, cart: &Cart) -> Result<Vec<CartLine>> {
        let lookups = cart.iter().map(|(product_id, &quantity)| async move {
            let unit_price = self.catalog.get_price(deadline, product_id).await?;
            Ok::<_, ServiceError>(CartLine {
                product_id: product_id.clone(),
                quantity,
                unit_price,
            })
        });

        try_join_all(lookups).await
    }
}

fn failed_at(stage: CheckoutStage, user_id: Uuid) -> impl FnOnce(ServiceError) -> ServiceError {
    move |e| {
        record_checkout_stage_failure(stage.as_str());
        error!(
            user_id = %user_id,
            stage = %stage,
            after_persist = stage.is_after_persist(),
            error = %e,
            "Checkout stage failed"
        );
        e
    }
}
