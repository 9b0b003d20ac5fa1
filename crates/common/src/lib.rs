//! Shared identifier and value types for the order and catalog services.

mod types;

pub use types::{
    AdjustmentKey, CustomerId, LineNumber, Money, OrderId, ProductId, ReconciliationId,
};
