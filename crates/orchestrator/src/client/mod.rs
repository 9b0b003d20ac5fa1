//! The inventory boundary as seen from the order side.

mod http;
mod local;

use async_trait::async_trait;
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, Product, StockAdjustment};
use inventory::InventoryError;
use thiserror::Error;

pub use http::HttpInventoryClient;
pub use local::LocalInventoryClient;

/// Errors from an inventory call.
///
/// Business rejections and transport failures are separate variants so that
/// callers retry only the latter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Adjustment {0} was voided")]
    AdjustmentVoided(AdjustmentKey),

    /// Any other request the catalog refused.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Inventory call timed out")]
    Timeout,
}

impl ClientError {
    /// Returns true if the call may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout)
    }
}

impl From<InventoryError> for ClientError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(id) => ClientError::ProductNotFound(id),
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => ClientError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            InventoryError::AdjustmentVoided(key) => ClientError::AdjustmentVoided(key),
            InventoryError::InvalidProduct(msg) | InventoryError::InvalidAdjustment(msg) => {
                ClientError::Rejected(msg)
            }
            other @ (InventoryError::Corrupt(_)
            | InventoryError::Database(_)
            | InventoryError::Migration(_)) => ClientError::Transport(other.to_string()),
        }
    }
}

/// Client for the catalog service.
///
/// Implementations hold one long-lived connection handle and never mutate
/// stock other than through [`adjust_stock`](Self::adjust_stock).
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Product, ClientError>;

    /// Applies a keyed stock adjustment. Re-sending the same key is safe.
    async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
    ) -> Result<AdjustmentReceipt, ClientError>;

    /// Settles an adjustment whose outcome is unknown, voiding it if it was
    /// never applied.
    async fn resolve_adjustment(&self, key: AdjustmentKey)
    -> Result<AdjustmentOutcome, ClientError>;
}
