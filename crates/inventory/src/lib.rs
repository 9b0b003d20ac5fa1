//! Product catalog and stock keeping.
//!
//! This crate provides:
//! - The [`InventoryStore`] trait with in-memory and PostgreSQL backends
//! - Keyed stock adjustments that apply at most once and can be voided
//! - The catalog HTTP router and the JSON types it exchanges

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod router;
pub mod store;
pub mod wire;

pub use config::CatalogConfig;
pub use error::{InventoryError, Result};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use router::create_router;
pub use store::InventoryStore;
