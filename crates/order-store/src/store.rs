use async_trait::async_trait;
use common::{LineNumber, OrderId};
use domain::{Order, OrderHeader, OrderLine, OrderStatus};

use crate::{ReconciliationEntry, Result};

/// Core trait for order store implementations.
///
/// An order is staged line by line under an allocated id and becomes visible
/// to readers only once its header is committed. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Allocates the next order id.
    ///
    /// Ids are unique and strictly increasing under concurrent callers.
    async fn next_order_id(&self) -> Result<OrderId>;

    /// Stages a line of a not yet committed order.
    async fn insert_line(&self, order_id: OrderId, line: &OrderLine) -> Result<()>;

    /// Removes every staged line of an order that was never committed.
    ///
    /// Committed orders are left untouched.
    async fn discard_lines(&self, order_id: OrderId) -> Result<()>;

    /// Commits the order header, making the order and its staged lines visible.
    async fn commit_order(&self, header: &OrderHeader) -> Result<()>;

    /// Loads a committed order with its lines in insertion order.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads every committed order, ordered by id.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Changes the status from `from` to `to` if `from` is still current.
    ///
    /// Fails with `StatusConflict` if the current status differs and with
    /// `OrderNotFound` if the order does not exist.
    async fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()>;

    /// Claims a held line for restocking.
    ///
    /// Returns false if the line is already being released or was released.
    /// Only the caller that receives true may restock the line.
    async fn begin_line_release(&self, order_id: OrderId, line_number: LineNumber)
    -> Result<bool>;

    /// Marks a claimed line as released once its stock is back in inventory.
    async fn finish_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()>;

    /// Returns a claimed line to held after its restock failed.
    async fn abort_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()>;

    /// Deletes a committed order and its lines in one transaction.
    ///
    /// Returns false if the order does not exist. Fails with
    /// `UnreleasedLines` while any line still holds stock.
    async fn delete_order(&self, order_id: OrderId) -> Result<bool>;

    /// Durably records an entry for out-of-band reconciliation.
    async fn record_reconciliation(&self, entry: &ReconciliationEntry) -> Result<()>;

    /// Lists reconciliation entries, oldest first.
    async fn list_reconciliations(&self) -> Result<Vec<ReconciliationEntry>>;
}
