use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::ids::{DocumentId, ProductRef};

/// Catalog product as held by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: DocumentId,
    pub external_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
}

impl Product {
    /// New product with freshly generated identifiers
    pub fn from_draft(draft: ProductDraft) -> Self {
        Self {
            id: DocumentId::generate(),
            external_id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            price: draft.price,
            stock: draft.stock,
        }
    }

    /// Replace the mutable fields, keeping both identifiers
    pub fn apply(&mut self, draft: ProductDraft) {
        self.name = draft.name;
        self.description = draft.description;
        self.price = draft.price;
        self.stock = draft.stock;
    }

    /// Both identifier forms, for cache invalidation
    pub fn refs(&self) -> [ProductRef; 2] {
        [
            ProductRef::Document(self.id.clone()),
            ProductRef::External(self.external_id),
        ]
    }
}

/// Client-supplied product fields for create and update
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProductDraft {
    #[validate(length(min = 1, message = "Product name cannot be empty"))]
    pub name: String,

    pub description: String,

    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,

    pub stock: u32,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut error = ValidationError::new("negative_price");
        error.message = Some("Price cannot be negative".into());
        return Err(error);
    }
    Ok(())
}
