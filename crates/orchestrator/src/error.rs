//! Orchestrator error types.

use common::{OrderId, ProductId};
use domain::{DomainError, OrderStatus};
use order_store::OrderStoreError;
use thiserror::Error;

/// Errors returned by order workflows.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

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

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The create request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The catalog could not be reached or did not answer in time.
    #[error("Inventory unavailable: {0}")]
    TransportFailure(String),

    /// Stock held by an existing order could not be returned.
    #[error("Compensation failed for order {order_id}: {reason}")]
    CompensationFailed { order_id: OrderId, reason: String },

    /// A failed create left stock taken that could not be returned.
    #[error("Order {order_id} failed and {lines} line(s) of reserved stock could not be returned")]
    OrphanedReservation { order_id: OrderId, lines: usize },

    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),

    /// A detached workflow task panicked or was aborted.
    #[error("Workflow task failed: {0}")]
    Internal(String),
}

impl From<DomainError> for OrchestratorError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvalidTransition { from, to } => {
                OrchestratorError::InvalidTransition { from, to }
            }
            other => OrchestratorError::InvalidRequest(other.to_string()),
        }
    }
}

/// Convenience type alias for orchestrator results.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
