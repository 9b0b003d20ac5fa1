use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, NewProduct, Product, StockAdjustment};
use tokio::sync::RwLock;

use crate::{InventoryError, InventoryStore, Result};

#[derive(Debug, Clone, Copy)]
enum KeyRecord {
    Applied(AdjustmentReceipt),
    Voided,
}

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    products: BTreeMap<ProductId, Product>,
    adjustments: HashMap<AdjustmentKey, KeyRecord>,
}

/// In-memory catalog for tests and local runs.
///
/// Every adjustment runs inside one write-lock critical section, which makes
/// the stock check and the update a single atomic step.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stock of a product, if it exists.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock_quantity)
    }

    /// Sum of stock across all products.
    pub async fn total_stock(&self) -> u64 {
        self.state
            .read()
            .await
            .products
            .values()
            .map(|p| u64::from(p.stock_quantity))
            .sum()
    }

    /// Number of keys that were applied.
    pub async fn applied_count(&self) -> usize {
        self.state
            .read()
            .await
            .adjustments
            .values()
            .filter(|r| matches!(r, KeyRecord::Applied(_)))
            .count()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn add_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let mut state = self.state.write().await;
        state.last_id += 1;
        let product = Product {
            id: ProductId::new(state.last_id),
            name: product.name,
            stock_quantity: product.stock_quantity,
            unit_price: product.unit_price,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<AdjustmentReceipt> {
        if adjustment.delta == 0 {
            return Err(InventoryError::InvalidAdjustment(
                "delta must not be zero".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        match state.adjustments.get(&adjustment.key) {
            Some(KeyRecord::Applied(receipt)) => return Ok(*receipt),
            Some(KeyRecord::Voided) => {
                return Err(InventoryError::AdjustmentVoided(adjustment.key));
            }
            None => {}
        }

        let product = state
            .products
            .get_mut(&adjustment.product_id)
            .ok_or(InventoryError::ProductNotFound(adjustment.product_id))?;

        if product.stock_quantity < adjustment.expected_minimum() {
            return Err(InventoryError::InsufficientStock {
                product_id: adjustment.product_id,
                requested: adjustment.quantity(),
                available: product.stock_quantity,
            });
        }
        let Some(next) = adjustment.apply_to(product.stock_quantity) else {
            return Err(InventoryError::InvalidAdjustment(format!(
                "restock of {} overflows stock of product {}",
                adjustment.quantity(),
                adjustment.product_id
            )));
        };
        product.stock_quantity = next;

        let receipt = AdjustmentReceipt {
            key: adjustment.key,
            product_id: adjustment.product_id,
            stock_quantity: next,
        };
        state
            .adjustments
            .insert(adjustment.key, KeyRecord::Applied(receipt));
        Ok(receipt)
    }

    async fn resolve_adjustment(&self, key: AdjustmentKey) -> Result<AdjustmentOutcome> {
        let mut state = self.state.write().await;
        let record = state.adjustments.entry(key).or_insert(KeyRecord::Voided);
        Ok(match record {
            KeyRecord::Applied(_) => AdjustmentOutcome::Applied,
            KeyRecord::Voided => AdjustmentOutcome::Voided,
        })
    }
}
