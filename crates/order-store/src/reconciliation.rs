//! Durable records of stock the order side could not return to inventory.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReconciliationId};
use serde::{Deserialize, Serialize};

use crate::error::OrderStoreError;

/// Why an entry needs operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Stock was taken for an order that no longer exists.
    OrphanedReservation,
    /// An existing order's line could not be restocked.
    UnreleasedStock,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::OrphanedReservation => "orphaned_reservation",
            ReconciliationKind::UnreleasedStock => "unreleased_stock",
        }
    }
}

impl std::fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReconciliationKind {
    type Err = OrderStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orphaned_reservation" => Ok(ReconciliationKind::OrphanedReservation),
            "unreleased_stock" => Ok(ReconciliationKind::UnreleasedStock),
            other => Err(OrderStoreError::Corrupt(format!(
                "unknown reconciliation kind: {other}"
            ))),
        }
    }
}

/// One unit of out-of-band reconciliation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub id: ReconciliationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub kind: ReconciliationKind,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        kind: ReconciliationKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ReconciliationId::new(),
            order_id,
            product_id,
            quantity,
            kind,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}
