pub mod error;
pub mod memory;
pub mod postgres;
pub mod reconciliation;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use reconciliation::{ReconciliationEntry, ReconciliationKind};
pub use store::OrderStore;
