//! Order orchestration across the order store and the catalog.
//!
//! Creating an order reserves stock line by line through an
//! [`InventoryClient`]; cancelling or deleting it returns the stock. Every
//! stock change is a keyed, conditional adjustment, so retries never apply
//! twice and concurrent orders never oversell. When a compensating restock
//! cannot complete, the affected lines are written to the order store's
//! reconciliation log.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod retry;

pub use client::{ClientError, HttpInventoryClient, InventoryClient, LocalInventoryClient};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use orchestrator::OrderOrchestrator;
pub use retry::RetryPolicy;
