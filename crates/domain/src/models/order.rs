use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::cart::{cart_total, CartLine};

/// Order status. Only `Pending` is set by this core; the rest are written
/// by fulfillment through `update`, with no enforced transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ServiceError::Validation(format!("unknown order status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Pending order carrying only a total
    pub fn pending(user_id: Uuid, total_price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: Vec::new(),
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending order whose total is the sum of the priced lines
    pub fn from_lines(user_id: Uuid, items: Vec<CartLine>) -> Self {
        let total_price = cart_total(&items);
        Self {
            items,
            ..Self::pending(user_id, total_price)
        }
    }
}

/// Mutable part of a persisted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: OrderStatus,
}

/// Aggregate figures over every stored order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub total_revenue: Decimal,
    pub average_order: Decimal,
    pub orders_last_30_days: i64,
}

impl OrderStats {
    /// Figures from already-aggregated totals; the average is rounded to cents.
    pub fn from_totals(total_orders: i64, total_revenue: Decimal, orders_last_30_days: i64) -> Self {
        let average_order = if total_orders > 0 {
            (total_revenue / Decimal::from(total_orders)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Self {
            total_orders,
            total_revenue,
            average_order,
            orders_last_30_days,
        }
    }

    /// Full scan; there is no incremental maintenance.
    pub fn compute(orders: &[Order], now: DateTime<Utc>) -> Self {
        let total_revenue: Decimal = orders.iter().map(|o| o.total_price).sum();
        let window_start = now - Duration::days(30);
        let recent = orders
            .iter()
            .filter(|o| o.created_at >= window_start)
            .count() as i64;

        Self::from_totals(orders.len() as i64, total_revenue, recent)
    }
}
