//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors raised by domain validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A status change that the order lifecycle does not allow.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A status name that is not part of the lifecycle.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// A line requested zero units.
    #[error("Invalid quantity for product {product_id}: quantity must be positive")]
    InvalidQuantity { product_id: ProductId },

    /// An order request without lines.
    #[error("Order must contain at least one item")]
    NoItems,

    /// A product definition that violates catalog invariants.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A line release state name that is not recognised.
    #[error("Unknown release state: {0}")]
    UnknownReleaseState(String),
}
