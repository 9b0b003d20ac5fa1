use common::{LineNumber, OrderId};
use domain::{DomainError, OrderStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// The order does not exist (or has not been committed yet).
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A compare-and-set on the order status found a different status.
    #[error(
        "Status conflict for order {order_id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The order still has lines whose stock has not been returned.
    #[error("Order {order_id} has {count} line(s) with unreleased stock")]
    UnreleasedLines { order_id: OrderId, count: usize },

    /// A line release step found the line in an unexpected state.
    #[error("Line {line_number} of order {order_id} is not in the expected release state")]
    LineStateConflict {
        order_id: OrderId,
        line_number: LineNumber,
    },

    /// A line with this number was already staged for the order.
    #[error("Line {line_number} of order {order_id} already exists")]
    DuplicateLine {
        order_id: OrderId,
        line_number: LineNumber,
    },

    /// The order header was already committed.
    #[error("Order already committed: {0}")]
    AlreadyCommitted(OrderId),

    /// The store cannot be reached.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

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

impl From<DomainError> for OrderStoreError {
    fn from(e: DomainError) -> Self {
        OrderStoreError::Corrupt(e.to_string())
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;
