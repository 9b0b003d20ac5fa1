//! Catalog product and stock adjustment types shared by both sides of the
//! inventory boundary.

use common::{AdjustmentKey, Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A catalog product as seen through the inventory boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock_quantity: u32,
    pub unit_price: Money,
}

/// Input for adding a product to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub stock_quantity: u32,
    pub unit_price: Money,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, stock_quantity: u32, unit_price: Money) -> Self {
        Self {
            name: name.into(),
            stock_quantity,
            unit_price,
        }
    }

    /// Checks catalog invariants: a non-blank name and a non-negative price.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidProduct(
                "product name must not be empty".to_string(),
            ));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::InvalidProduct(format!(
                "unit price must not be negative, got {}",
                self.unit_price
            )));
        }
        Ok(())
    }
}

/// A keyed, conditional change to a product's stock.
///
/// Negative deltas are decrements and only apply while the current stock is
/// at least [`expected_minimum`](Self::expected_minimum). Positive deltas are
/// restocks and always apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub delta: i64,
    pub key: AdjustmentKey,
}

impl StockAdjustment {
    /// Decrement by `quantity` under a fresh key.
    pub fn decrement(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            delta: -i64::from(quantity),
            key: AdjustmentKey::new(),
        }
    }

    /// Restock by `quantity` under a fresh key.
    pub fn restock(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            delta: i64::from(quantity),
            key: AdjustmentKey::new(),
        }
    }

    pub fn is_decrement(&self) -> bool {
        self.delta < 0
    }

    /// Units the adjustment moves, regardless of direction.
    pub fn quantity(&self) -> u32 {
        u32::try_from(self.delta.unsigned_abs()).unwrap_or(u32::MAX)
    }

    /// Lowest current stock at which the adjustment may apply.
    pub fn expected_minimum(&self) -> u32 {
        if self.is_decrement() { self.quantity() } else { 0 }
    }

    /// Stock after applying the adjustment to `current`, or `None` when the
    /// result would be negative or overflow.
    pub fn apply_to(&self, current: u32) -> Option<u32> {
        let next = i64::from(current).checked_add(self.delta)?;
        u32::try_from(next).ok()
    }
}

/// Confirmation that an adjustment is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReceipt {
    pub key: AdjustmentKey,
    pub product_id: ProductId,
    /// Stock right after the adjustment was applied.
    pub stock_quantity: u32,
}

/// Final outcome of an adjustment key after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentOutcome {
    /// The adjustment changed the stock.
    Applied,
    /// The key was never applied and can no longer be.
    Voided,
}

impl AdjustmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentOutcome::Applied => "applied",
            AdjustmentOutcome::Voided => "voided",
        }
    }
}

impl std::fmt::Display for AdjustmentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
