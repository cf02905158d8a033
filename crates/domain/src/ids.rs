//! Identifier parsing for the two product id shapes and the UUID ids used
//! by orders and users.
//!
//! Products live in a document store keyed by a 24-hex document id and also
//! carry an external UUID. Callers may hand us either form; an id containing
//! a hyphen is always treated as a UUID, anything else must be a document id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use uuid::Uuid;

use crate::errors::ServiceError;

const DOCUMENT_ID_LEN: usize = 24;

/// Store-native product key: 12 bytes rendered as 24 lowercase hex digits.
///
/// The first four bytes are the creation time in seconds, the rest are
/// random, so ids sort roughly by creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let random = Uuid::new_v4();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);

        let mut hex = String::with_capacity(DOCUMENT_ID_LEN);
        for byte in bytes {
            // Writing to a String cannot fail
            let _ = write!(hex, "{:02x}", byte);
        }
        Self(hex)
    }

    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.len() != DOCUMENT_ID_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ServiceError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// A product identifier in either supported form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductRef {
    Document(DocumentId),
    External(Uuid),
}

impl ProductRef {
    /// Route by shape: hyphenated ids are external UUIDs, the rest document ids.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.contains('-') {
            Uuid::try_parse(trimmed)
                .map(ProductRef::External)
                .map_err(|_| ServiceError::InvalidIdentifier(raw.to_string()))
        } else {
            DocumentId::parse(trimmed).map(ProductRef::Document)
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ProductRef::External(_))
    }

    /// Cache key for the single-product entry under this identifier form
    pub fn cache_key(&self) -> String {
        format!("product:{}", self)
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductRef::Document(id) => write!(f, "{}", id),
            ProductRef::External(uuid) => write!(f, "{}", uuid.hyphenated()),
        }
    }
}

impl From<DocumentId> for ProductRef {
    fn from(id: DocumentId) -> Self {
        ProductRef::Document(id)
    }
}

/// Parse an order or user id
pub fn parse_uuid(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::try_parse(raw.trim()).map_err(|_| ServiceError::InvalidIdentifier(raw.to_string()))
}
