//! JSON bodies exchanged with the catalog service.
//!
//! Products and adjustment receipts travel as their domain types; the types
//! here cover requests and errors.

use common::{AdjustmentKey, Money, ProductId};
use domain::AdjustmentOutcome;
use serde::{Deserialize, Serialize};

use crate::InventoryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub stock_quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    pub key: AdjustmentKey,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub outcome: AdjustmentOutcome,
}

/// Error codes carried in [`ErrorBody::error`].
pub mod codes {
    pub const PRODUCT_NOT_FOUND: &str = "product_not_found";
    pub const INSUFFICIENT_STOCK: &str = "insufficient_stock";
    pub const ADJUSTMENT_VOIDED: &str = "adjustment_voided";
    pub const INVALID_PRODUCT: &str = "invalid_product";
    pub const INVALID_ADJUSTMENT: &str = "invalid_adjustment";
    pub const INTERNAL: &str = "internal";
}

/// Error response body with the structured fields a client needs to rebuild
/// the error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<AdjustmentKey>,
}

impl ErrorBody {
    fn new(code: &str, message: String) -> Self {
        Self {
            error: code.to_string(),
            message,
            product_id: None,
            requested: None,
            available: None,
            key: None,
        }
    }
}

impl From<&InventoryError> for ErrorBody {
    fn from(err: &InventoryError) -> Self {
        let message = err.to_string();
        match err {
            InventoryError::ProductNotFound(id) => ErrorBody {
                product_id: Some(*id),
                ..ErrorBody::new(codes::PRODUCT_NOT_FOUND, message)
            },
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => ErrorBody {
                product_id: Some(*product_id),
                requested: Some(*requested),
                available: Some(*available),
                ..ErrorBody::new(codes::INSUFFICIENT_STOCK, message)
            },
            InventoryError::AdjustmentVoided(key) => ErrorBody {
                key: Some(*key),
                ..ErrorBody::new(codes::ADJUSTMENT_VOIDED, message)
            },
            InventoryError::InvalidProduct(_) => ErrorBody::new(codes::INVALID_PRODUCT, message),
            InventoryError::InvalidAdjustment(_) => {
                ErrorBody::new(codes::INVALID_ADJUSTMENT, message)
            }
            InventoryError::Corrupt(_)
            | InventoryError::Database(_)
            | InventoryError::Migration(_) => ErrorBody::new(codes::INTERNAL, message),
        }
    }
}
