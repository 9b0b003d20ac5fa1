use common::{AdjustmentKey, ProductId};
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when reading or adjusting the catalog.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A decrement would take the stock below zero.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The adjustment key was voided by a resolve and can never apply.
    #[error("Adjustment {0} was voided")]
    AdjustmentVoided(AdjustmentKey),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// A stored value does not decode into the domain model.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<DomainError> for InventoryError {
    fn from(e: DomainError) -> Self {
        InventoryError::InvalidProduct(e.to_string())
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
