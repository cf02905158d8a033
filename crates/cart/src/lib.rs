pub mod cart_store;
pub mod checkout;
pub mod lease;
pub mod stage;

pub use cart_store::CartStore;
pub use checkout::CartService;
pub use lease::{CheckoutLease, LeaseToken};
pub use stage::{CheckoutOutcome, CheckoutStage};
