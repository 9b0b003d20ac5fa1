use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, Product, StockAdjustment};
use inventory::InventoryStore;
use tokio::sync::RwLock;

use super::{ClientError, InventoryClient};

#[derive(Debug, Default)]
struct Faults {
    fail_next: AtomicU32,
    time_out_after_apply: AtomicU32,
    fail_restocks: AtomicBool,
    fail_resolves: AtomicBool,
    latency_ms: AtomicU64,
    failing_products: RwLock<HashSet<ProductId>>,
    calls: AtomicU64,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-process inventory client over a catalog store.
///
/// Used by tests, benches and single-process deployments. Faults can be
/// injected to simulate an unreliable network between the two services.
pub struct LocalInventoryClient<S: InventoryStore> {
    store: Arc<S>,
    faults: Arc<Faults>,
}

impl<S: InventoryStore> Clone for LocalInventoryClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            faults: Arc::clone(&self.faults),
        }
    }
}

impl<S: InventoryStore> LocalInventoryClient<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            faults: Arc::new(Faults::default()),
        }
    }

    /// The catalog store behind this client.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fails the next `n` calls of any kind with a transport error before
    /// they reach the store.
    pub fn fail_next_calls(&self, n: u32) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    /// Applies the next `n` adjustments, then reports a timeout instead of
    /// the receipt.
    pub fn time_out_after_apply(&self, n: u32) {
        self.faults.time_out_after_apply.store(n, Ordering::SeqCst);
    }

    /// Fails every restock (positive adjustment) while set.
    pub fn set_fail_restocks(&self, fail: bool) {
        self.faults.fail_restocks.store(fail, Ordering::SeqCst);
    }

    /// Fails every resolve call while set.
    pub fn set_fail_resolves(&self, fail: bool) {
        self.faults.fail_resolves.store(fail, Ordering::SeqCst);
    }

    /// Fails every call that touches `product_id` until healed.
    pub async fn fail_product(&self, product_id: ProductId) {
        self.faults.failing_products.write().await.insert(product_id);
    }

    pub async fn heal_product(&self, product_id: ProductId) {
        self.faults.failing_products.write().await.remove(&product_id);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of calls made through this client, including failed ones.
    pub fn calls(&self) -> u64 {
        self.faults.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, product_id: Option<ProductId>) -> Result<(), ClientError> {
        self.faults.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if take_one(&self.faults.fail_next) {
            return Err(ClientError::Transport("injected network failure".to_string()));
        }
        let Some(id) = product_id else {
            return Ok(());
        };
        if self.faults.failing_products.read().await.contains(&id) {
            return Err(ClientError::Transport(format!(
                "injected failure for product {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InventoryStore> InventoryClient for LocalInventoryClient<S> {
    async fn get_product(&self, product_id: ProductId) -> Result<Product, ClientError> {
        self.enter(Some(product_id)).await?;
        self.store
            .get_product(product_id)
            .await?
            .ok_or(ClientError::ProductNotFound(product_id))
    }

    async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
    ) -> Result<AdjustmentReceipt, ClientError> {
        self.enter(Some(adjustment.product_id)).await?;
        if !adjustment.is_decrement() && self.faults.fail_restocks.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("injected restock failure".to_string()));
        }

        let receipt = self.store.adjust_stock(adjustment).await?;
        if take_one(&self.faults.time_out_after_apply) {
            return Err(ClientError::Timeout);
        }
        Ok(receipt)
    }

    async fn resolve_adjustment(
        &self,
        key: AdjustmentKey,
    ) -> Result<AdjustmentOutcome, ClientError> {
        self.enter(None).await?;
        if self.faults.fail_resolves.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("injected resolve failure".to_string()));
        }
        Ok(self.store.resolve_adjustment(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use domain::NewProduct;
    use inventory::InMemoryInventoryStore;

    async fn setup() -> (LocalInventoryClient<InMemoryInventoryStore>, ProductId) {
        let store = Arc::new(InMemoryInventoryStore::new());
        let product = store
            .add_product(NewProduct::new("Widget", 10, Money::from_cents(500)))
            .await
            .unwrap();
        (LocalInventoryClient::new(store), product.id)
    }

    #[tokio::test]
    async fn test_fail_next_calls_is_consumed() {
        let (client, id) = setup().await;
        client.fail_next_calls(1);

        assert!(matches!(
            client.get_product(id).await,
            Err(ClientError::Transport(_))
        ));
        assert_eq!(client.get_product(id).await.unwrap().stock_quantity, 10);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_time_out_after_apply_still_applies() {
        let (client, id) = setup().await;
        client.time_out_after_apply(1);

        let adjustment = StockAdjustment::decrement(id, 3);
        assert_eq!(
            client.adjust_stock(adjustment).await,
            Err(ClientError::Timeout)
        );
        assert_eq!(client.store().stock_of(id).await, Some(7));
        assert_eq!(
            client.resolve_adjustment(adjustment.key).await.unwrap(),
            AdjustmentOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_failing_product_is_isolated() {
        let (client, id) = setup().await;
        client.fail_product(id).await;
        assert!(client.get_product(id).await.is_err());
        assert!(matches!(
            client.get_product(ProductId::new(99)).await,
            Err(ClientError::ProductNotFound(_))
        ));

        client.heal_product(id).await;
        assert!(client.get_product(id).await.is_ok());
    }
}
