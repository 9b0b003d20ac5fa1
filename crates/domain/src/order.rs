//! Orders and their lines.

use chrono::{DateTime, Utc};
use common::{CustomerId, LineNumber, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::OrderStatus;

/// Whether the stock reserved by a line has been returned to inventory.
///
/// ```text
/// Held ──► Releasing ──► Released
///   ▲          │
///   └──────────┘ (restock failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    /// The line's quantity is still taken out of inventory.
    #[default]
    Held,
    /// A request has claimed the line and is restocking it.
    Releasing,
    /// The quantity was returned to inventory.
    Released,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Held => "held",
            ReleaseState::Releasing => "releasing",
            ReleaseState::Released => "released",
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReleaseState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReleaseState::Held),
            "releasing" => Ok(ReleaseState::Releasing),
            "released" => Ok(ReleaseState::Released),
            other => Err(DomainError::UnknownReleaseState(other.to_string())),
        }
    }
}

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Validates the lines of a create request: at least one line, every
/// quantity positive.
pub fn validate_line_requests(lines: &[LineRequest]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::NoItems);
    }
    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(DomainError::InvalidQuantity {
            product_id: line.product_id,
        });
    }
    Ok(())
}

/// A persisted line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_number: LineNumber,
    pub product_id: ProductId,
    /// Product name at the time the order was placed.
    pub product_name: String,
    pub quantity: u32,
    /// Unit price captured when the order was placed; never re-priced.
    pub unit_price: Money,
    pub release_state: ReleaseState,
}

impl OrderLine {
    pub fn new(
        line_number: LineNumber,
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            line_number,
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            release_state: ReleaseState::Held,
        }
    }

    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    pub fn is_released(&self) -> bool {
        self.release_state == ReleaseState::Released
    }
}

/// The order row without its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderHeader {
    /// Header of a freshly created order.
    pub fn pending(id: OrderId, customer_id: CustomerId) -> Self {
        Self {
            id,
            customer_id,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// A committed order with its lines in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLine>,
}

impl Order {
    pub fn from_parts(header: OrderHeader, mut items: Vec<OrderLine>) -> Self {
        items.sort_by_key(|l| l.line_number);
        Self {
            id: header.id,
            customer_id: header.customer_id,
            status: header.status,
            created_at: header.created_at,
            items,
        }
    }

    /// Sum of all line totals at their captured prices.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(OrderLine::total_price).sum()
    }

    /// Lines whose stock has not been returned to inventory yet.
    pub fn unreleased_lines(&self) -> impl Iterator<Item = &OrderLine> {
        self.items.iter().filter(|l| !l.is_released())
    }

    /// Units of `product_id` this order still keeps out of inventory.
    pub fn reserved_quantity(&self, product_id: ProductId) -> u64 {
        self.unreleased_lines()
            .filter(|l| l.product_id == product_id)
            .map(|l| u64::from(l.quantity))
            .sum()
    }
}
