use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{LineNumber, OrderId};
use domain::{Order, OrderHeader, OrderLine, OrderStatus, ReleaseState};
use tokio::sync::RwLock;

use crate::{OrderStore, OrderStoreError, ReconciliationEntry, Result};

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    headers: BTreeMap<OrderId, OrderHeader>,
    lines: HashMap<OrderId, BTreeMap<LineNumber, OrderLine>>,
    reconciliations: Vec<ReconciliationEntry>,
}

impl State {
    fn line_mut(&mut self, order_id: OrderId, line_number: LineNumber) -> Result<&mut OrderLine> {
        self.lines
            .get_mut(&order_id)
            .and_then(|lines| lines.get_mut(&line_number))
            .ok_or(OrderStoreError::LineStateConflict {
                order_id,
                line_number,
            })
    }

    fn order(&self, header: &OrderHeader) -> Order {
        let lines = self
            .lines
            .get(&header.id)
            .map(|lines| lines.values().cloned().collect())
            .unwrap_or_default();
        Order::from_parts(header.clone(), lines)
    }

    fn move_line(
        &mut self,
        order_id: OrderId,
        line_number: LineNumber,
        from: ReleaseState,
        to: ReleaseState,
    ) -> Result<()> {
        let line = self.line_mut(order_id, line_number)?;
        if line.release_state != from {
            return Err(OrderStoreError::LineStateConflict {
                order_id,
                line_number,
            });
        }
        line.release_state = to;
        Ok(())
    }
}

/// In-memory order store implementation for testing.
///
/// This implementation keeps all orders in memory and provides the same
/// interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
    fail_on_allocate: Arc<AtomicBool>,
    fail_after_commit: Arc<AtomicBool>,
    fail_release_updates: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures id allocation to fail, simulating an unreachable database.
    pub fn set_fail_on_allocate(&self, fail: bool) {
        self.fail_on_allocate.store(fail, Ordering::SeqCst);
    }

    /// Makes `commit_order` report an error after the order is committed,
    /// simulating a lost commit acknowledgement.
    pub fn set_fail_after_commit(&self, fail: bool) {
        self.fail_after_commit.store(fail, Ordering::SeqCst);
    }

    /// Makes `finish_line_release` and `abort_line_release` fail without
    /// touching the line.
    pub fn set_fail_release_updates(&self, fail: bool) {
        self.fail_release_updates.store(fail, Ordering::SeqCst);
    }

    fn check_release_updates(&self) -> Result<()> {
        if self.fail_release_updates.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable(
                "line state update failed".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.headers.len()
    }

    /// Returns the number of lines stored under an order id, committed or not.
    pub async fn line_count(&self, order_id: OrderId) -> usize {
        self.state
            .read()
            .await
            .lines
            .get(&order_id)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn next_order_id(&self) -> Result<OrderId> {
        if self.fail_on_allocate.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable(
                "order id sequence unavailable".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        state.last_id += 1;
        Ok(OrderId::new(state.last_id))
    }

    async fn insert_line(&self, order_id: OrderId, line: &OrderLine) -> Result<()> {
        let mut state = self.state.write().await;
        if state.headers.contains_key(&order_id) {
            return Err(OrderStoreError::AlreadyCommitted(order_id));
        }
        let lines = state.lines.entry(order_id).or_default();
        if lines.contains_key(&line.line_number) {
            return Err(OrderStoreError::DuplicateLine {
                order_id,
                line_number: line.line_number,
            });
        }
        lines.insert(line.line_number, line.clone());
        Ok(())
    }

    async fn discard_lines(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.headers.contains_key(&order_id) {
            state.lines.remove(&order_id);
        }
        Ok(())
    }

    async fn commit_order(&self, header: &OrderHeader) -> Result<()> {
        let mut state = self.state.write().await;
        if state.headers.contains_key(&header.id) {
            return Err(OrderStoreError::AlreadyCommitted(header.id));
        }
        state.headers.insert(header.id, header.clone());
        if self.fail_after_commit.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable(
                "connection lost after commit".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.headers.get(&order_id).map(|h| state.order(h)))
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.headers.values().map(|h| state.order(h)).collect())
    }

    async fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let header = state
            .headers
            .get_mut(&order_id)
            .ok_or(OrderStoreError::OrderNotFound(order_id))?;
        if header.status != from {
            return Err(OrderStoreError::StatusConflict {
                order_id,
                expected: from,
                actual: header.status,
            });
        }
        header.status = to;
        Ok(())
    }

    async fn begin_line_release(
        &self,
        order_id: OrderId,
        line_number: LineNumber,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let line = state.line_mut(order_id, line_number)?;
        if line.release_state != ReleaseState::Held {
            return Ok(false);
        }
        line.release_state = ReleaseState::Releasing;
        Ok(true)
    }

    async fn finish_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()> {
        self.check_release_updates()?;
        self.state.write().await.move_line(
            order_id,
            line_number,
            ReleaseState::Releasing,
            ReleaseState::Released,
        )
    }

    async fn abort_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()> {
        self.check_release_updates()?;
        self.state.write().await.move_line(
            order_id,
            line_number,
            ReleaseState::Releasing,
            ReleaseState::Held,
        )
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.headers.contains_key(&order_id) {
            return Ok(false);
        }
        let unreleased = state
            .lines
            .get(&order_id)
            .map_or(0, |lines| lines.values().filter(|l| !l.is_released()).count());
        if unreleased > 0 {
            return Err(OrderStoreError::UnreleasedLines {
                order_id,
                count: unreleased,
            });
        }
        state.headers.remove(&order_id);
        state.lines.remove(&order_id);
        Ok(true)
    }

    async fn record_reconciliation(&self, entry: &ReconciliationEntry) -> Result<()> {
        self.state.write().await.reconciliations.push(entry.clone());
        Ok(())
    }

    async fn list_reconciliations(&self) -> Result<Vec<ReconciliationEntry>> {
        Ok(self.state.read().await.reconciliations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, Money, ProductId};

    fn line(n: u32, product: i64, qty: u32) -> OrderLine {
        OrderLine::new(
            LineNumber::new(n),
            ProductId::new(product),
            "Widget",
            qty,
            Money::from_cents(250),
        )
    }

    async fn committed_order(store: &InMemoryOrderStore) -> OrderId {
        let id = store.next_order_id().await.unwrap();
        store.insert_line(id, &line(1, 10, 2)).await.unwrap();
        store.insert_line(id, &line(2, 11, 1)).await.unwrap();
        store
            .commit_order(&OrderHeader::pending(id, CustomerId::new(1)))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_ids_are_strictly_increasing() {
        let store = InMemoryOrderStore::new();
        let a = store.next_order_id().await.unwrap();
        let b = store.next_order_id().await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_allocation_failure() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_allocate(true);
        assert!(matches!(
            store.next_order_id().await,
            Err(OrderStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_staged_lines_are_invisible_until_commit() {
        let store = InMemoryOrderStore::new();
        let id = store.next_order_id().await.unwrap();
        store.insert_line(id, &line(1, 10, 2)).await.unwrap();

        assert!(store.get_order(id).await.unwrap().is_none());
        assert!(store.list_orders().await.unwrap().is_empty());

        store
            .commit_order(&OrderHeader::pending(id, CustomerId::new(1)))
            .await
            .unwrap();
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_discard_lines_only_touches_uncommitted_orders() {
        let store = InMemoryOrderStore::new();
        let staged = store.next_order_id().await.unwrap();
        store.insert_line(staged, &line(1, 10, 2)).await.unwrap();
        store.discard_lines(staged).await.unwrap();
        assert_eq!(store.line_count(staged).await, 0);

        let committed = committed_order(&store).await;
        store.discard_lines(committed).await.unwrap();
        assert_eq!(store.line_count(committed).await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_line_is_rejected() {
        let store = InMemoryOrderStore::new();
        let id = store.next_order_id().await.unwrap();
        store.insert_line(id, &line(1, 10, 2)).await.unwrap();
        let result = store.insert_line(id, &line(1, 11, 2)).await;
        assert!(matches!(result, Err(OrderStoreError::DuplicateLine { .. })));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let id = committed_order(&store).await;

        store
            .transition_status(id, OrderStatus::Pending, OrderStatus::Processing)
            .await
            .unwrap();
        let result = store
            .transition_status(id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await;
        assert!(matches!(
            result,
            Err(OrderStoreError::StatusConflict {
                actual: OrderStatus::Processing,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_line_release_is_claimed_once() {
        let store = InMemoryOrderStore::new();
        let id = committed_order(&store).await;
        let n = LineNumber::first();

        assert!(store.begin_line_release(id, n).await.unwrap());
        assert!(!store.begin_line_release(id, n).await.unwrap());

        store.abort_line_release(id, n).await.unwrap();
        assert!(store.begin_line_release(id, n).await.unwrap());
        store.finish_line_release(id, n).await.unwrap();
        assert!(!store.begin_line_release(id, n).await.unwrap());
        assert!(matches!(
            store.finish_line_release(id, n).await,
            Err(OrderStoreError::LineStateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_release_update_leaves_line_claimed() {
        let store = InMemoryOrderStore::new();
        let id = committed_order(&store).await;
        let n = LineNumber::first();
        assert!(store.begin_line_release(id, n).await.unwrap());

        store.set_fail_release_updates(true);
        assert!(matches!(
            store.finish_line_release(id, n).await,
            Err(OrderStoreError::Unavailable(_))
        ));
        assert!(store.abort_line_release(id, n).await.is_err());

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.items[0].release_state, ReleaseState::Releasing);
    }

    #[tokio::test]
    async fn test_commit_error_after_write_still_commits() {
        let store = InMemoryOrderStore::new();
        store.set_fail_after_commit(true);
        let id = store.next_order_id().await.unwrap();
        store.insert_line(id, &line(1, 10, 2)).await.unwrap();

        let result = store
            .commit_order(&OrderHeader::pending(id, CustomerId::new(1)))
            .await;
        assert!(matches!(result, Err(OrderStoreError::Unavailable(_))));
        assert!(store.get_order(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_requires_released_lines() {
        let store = InMemoryOrderStore::new();
        let id = committed_order(&store).await;

        let result = store.delete_order(id).await;
        assert!(matches!(
            result,
            Err(OrderStoreError::UnreleasedLines { count: 2, .. })
        ));

        for n in [LineNumber::new(1), LineNumber::new(2)] {
            assert!(store.begin_line_release(id, n).await.unwrap());
            store.finish_line_release(id, n).await.unwrap();
        }
        assert!(store.delete_order(id).await.unwrap());
        assert!(!store.delete_order(id).await.unwrap());
        assert_eq!(store.line_count(id).await, 0);
    }

    #[tokio::test]
    async fn test_list_orders_is_ordered_by_id() {
        let store = InMemoryOrderStore::new();
        let first = committed_order(&store).await;
        let second = committed_order(&store).await;
        let ids: Vec<OrderId> = store
            .list_orders()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }
}
