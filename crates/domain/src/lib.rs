//! Domain model shared by the order and catalog services.
//!
//! This crate provides:
//! - Order, order line and order header types
//! - The order status state machine
//! - Product and keyed stock adjustment types exchanged across the
//!   inventory boundary

pub mod error;
pub mod order;
pub mod product;
pub mod status;

pub use error::DomainError;
pub use order::{
    LineRequest, Order, OrderHeader, OrderLine, ReleaseState, validate_line_requests,
};
pub use product::{AdjustmentOutcome, AdjustmentReceipt, NewProduct, Product, StockAdjustment};
pub use status::OrderStatus;
