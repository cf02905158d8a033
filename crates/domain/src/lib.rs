pub mod errors;
pub mod ids;
pub mod models;

pub use errors::{ServiceError, StoreKind};
pub use ids::{parse_uuid, DocumentId, ProductRef};
pub use models::cart::{cart_total, Cart, CartLine};
pub use models::order::{Order, OrderPatch, OrderStats, OrderStatus};
pub use models::product::{Product, ProductDraft};
pub use models::user::{NewUser, User, UserUpdate};

pub type Result<T> = std::result::Result<T, ServiceError>;
