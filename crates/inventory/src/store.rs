use async_trait::async_trait;
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, NewProduct, Product, StockAdjustment};

use crate::Result;

/// Core trait for catalog storage.
///
/// [`adjust_stock`](Self::adjust_stock) is the only way stock changes. It is a
/// single atomic check-and-update, so concurrent decrements can never take a
/// product below zero.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Adds a product and returns it with its assigned id.
    async fn add_product(&self, product: NewProduct) -> Result<Product>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Applies a keyed stock adjustment.
    ///
    /// A decrement only applies while the current stock covers it, otherwise
    /// `InsufficientStock` is returned and nothing changes. Re-sending an
    /// applied key returns the original receipt without applying again. A
    /// voided key fails with `AdjustmentVoided`.
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<AdjustmentReceipt>;

    /// Settles an adjustment whose outcome the caller could not observe.
    ///
    /// Reports `Applied` if the key was applied. Otherwise the key is voided
    /// atomically, so a late delivery of the original request is rejected,
    /// and `Voided` is reported.
    async fn resolve_adjustment(&self, key: AdjustmentKey) -> Result<AdjustmentOutcome>;
}
