use std::fmt;

/// Steps of the checkout saga, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    /// Take the per-user checkout lease
    AcquireLease,
    /// Read the cart mapping
    ReadCart,
    /// Look up the current price of every line
    ResolvePrices,
    /// Write the order to the relational store
    PersistOrder,
    /// Delete the cart; the only step that can fail after the order exists
    ClearCart,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::AcquireLease => "acquire_lease",
            CheckoutStage::ReadCart => "read_cart",
            CheckoutStage::ResolvePrices => "resolve_prices",
            CheckoutStage::PersistOrder => "persist_order",
            CheckoutStage::ClearCart => "clear_cart",
        }
    }

    /// Whether a failure at this stage leaves a persisted order behind
    pub fn is_after_persist(&self) -> bool {
        matches!(self, CheckoutStage::ClearCart)
    }
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a checkout ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Order persisted and cart cleared
    Completed,
    /// Failed before the order was persisted; nothing changed
    Aborted,
    /// Order persisted but the cart is still there
    Partial,
    /// Another checkout for the same user held the lease
    Contended,
}

impl fmt::Display for CheckoutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutOutcome::Completed => write!(f, "completed"),
            CheckoutOutcome::Aborted => write!(f, "aborted"),
            CheckoutOutcome::Partial => write!(f, "partial"),
            CheckoutOutcome::Contended => write!(f, "contended"),
        }
    }
}
