//! Order workflows: create, read, status changes and delete.

use std::sync::Arc;
use std::time::Instant;

use common::{AdjustmentKey, CustomerId, LineNumber, OrderId, ProductId};
use domain::{
    AdjustmentOutcome, LineRequest, Order, OrderHeader, OrderLine, OrderStatus, Product,
    ReleaseState, StockAdjustment, validate_line_requests,
};
use order_store::{OrderStore, OrderStoreError, ReconciliationEntry, ReconciliationKind};

use crate::{ClientError, InventoryClient, OrchestratorConfig, OrchestratorError, Result};

/// Why a stock adjustment did not go through.
#[derive(Debug)]
enum AdjustFailure {
    /// The adjustment is known not to have applied.
    NotApplied(ClientError),
    /// Neither the adjustment nor its resolution got an answer.
    Unknown(ClientError),
}

impl AdjustFailure {
    fn error(&self) -> &ClientError {
        match self {
            AdjustFailure::NotApplied(e) | AdjustFailure::Unknown(e) => e,
        }
    }
}

/// Stock taken for one line of an order being created.
#[derive(Debug, Clone, Copy)]
struct Taken {
    product_id: ProductId,
    quantity: u32,
    /// Key of a decrement whose outcome could not be settled.
    unsettled: Option<AdjustmentKey>,
}

/// A line whose stock could not be returned.
#[derive(Debug)]
struct ReleaseFailure {
    line: OrderLine,
    reason: String,
    /// Already written to the reconciliation log.
    recorded: bool,
}

/// Coordinates the order store and the catalog.
///
/// Holds no lock across requests: stock is only changed through keyed,
/// conditional adjustments, and order rows through compare-and-set store
/// operations.
pub struct OrderOrchestrator<S: OrderStore, I: InventoryClient> {
    store: S,
    inventory: I,
    config: OrchestratorConfig,
}

impl<S, I> OrderOrchestrator<S, I>
where
    S: OrderStore,
    I: InventoryClient,
{
    /// Creates an orchestrator with the default configuration.
    pub fn new(store: S, inventory: I) -> Self {
        Self::with_config(store, inventory, OrchestratorConfig::default())
    }

    pub fn with_config(store: S, inventory: I, config: OrchestratorConfig) -> Self {
        Self {
            store,
            inventory,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Creates an order, reserving stock for every line.
    ///
    /// Lines are processed in request order. If any line fails, the stock
    /// already taken is returned and the staged lines are removed, so no
    /// order exists afterwards. When that rollback cannot return some stock,
    /// the lines are logged for reconciliation and `OrphanedReservation` is
    /// returned instead of the original error.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        lines: &[LineRequest],
    ) -> Result<OrderId> {
        let start = Instant::now();
        let result = self.run_create(customer_id, lines).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order_id) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(%order_id, "order created");
            }
            Err(e) => {
                metrics::counter!("orders_create_failed_total", "reason" => failure_label(e))
                    .increment(1);
                tracing::warn!(error = %e, "order creation failed");
            }
        }
        result
    }

    async fn run_create(&self, customer_id: CustomerId, lines: &[LineRequest]) -> Result<OrderId> {
        validate_line_requests(lines)?;

        let order_id = self.store.next_order_id().await?;
        let mut taken = Vec::with_capacity(lines.len());

        let mut line_number = LineNumber::first();
        for request in lines {
            if let Err(e) = self
                .reserve_line(order_id, line_number, request, &mut taken)
                .await
            {
                return Err(self.unwind_create(order_id, &taken, e).await);
            }
            line_number = line_number.next();
        }

        let header = OrderHeader::pending(order_id, customer_id);
        if let Err(e) = self.store.commit_order(&header).await {
            // The commit may have landed before the error surfaced.
            match self.store.get_order(order_id).await {
                Ok(Some(_)) => {
                    tracing::warn!(%order_id, error = %e, "commit reported an error but the order is visible");
                    return Ok(order_id);
                }
                Ok(None) => {}
                Err(lookup) => {
                    tracing::warn!(%order_id, error = %lookup, "could not check commit outcome");
                }
            }
            return Err(self.unwind_create(order_id, &taken, e.into()).await);
        }
        Ok(order_id)
    }

    /// Reads, validates, stages and decrements one line.
    ///
    /// A decrement rejected for lack of stock after a successful read means
    /// another order won the race; the sequence is repeated up to
    /// `reservation_attempts` times.
    async fn reserve_line(
        &self,
        order_id: OrderId,
        line_number: LineNumber,
        request: &LineRequest,
        taken: &mut Vec<Taken>,
    ) -> Result<()> {
        let mut staged = false;
        let mut attempt = 1;

        loop {
            let product = self.fetch_product(request.product_id).await?;
            if product.stock_quantity < request.quantity {
                return Err(OrchestratorError::InsufficientStock {
                    product_id: product.id,
                    requested: request.quantity,
                    available: product.stock_quantity,
                });
            }

            if !staged {
                let line = OrderLine::new(
                    line_number,
                    product.id,
                    product.name,
                    request.quantity,
                    product.unit_price,
                );
                self.store.insert_line(order_id, &line).await?;
                staged = true;
            }

            let decrement = StockAdjustment::decrement(request.product_id, request.quantity);
            match self.apply_adjustment(decrement).await {
                Ok(()) => {
                    taken.push(Taken {
                        product_id: request.product_id,
                        quantity: request.quantity,
                        unsettled: None,
                    });
                    return Ok(());
                }
                Err(AdjustFailure::NotApplied(ClientError::InsufficientStock {
                    available, ..
                })) => {
                    if attempt >= self.config.reservation_attempts {
                        return Err(OrchestratorError::InsufficientStock {
                            product_id: request.product_id,
                            requested: request.quantity,
                            available,
                        });
                    }
                    tracing::debug!(
                        %order_id,
                        product_id = %request.product_id,
                        attempt,
                        "lost stock race, retrying line"
                    );
                    attempt += 1;
                }
                Err(AdjustFailure::NotApplied(e)) => return Err(client_failure(e)),
                Err(AdjustFailure::Unknown(e)) => {
                    taken.push(Taken {
                        product_id: request.product_id,
                        quantity: request.quantity,
                        unsettled: Some(decrement.key),
                    });
                    return Err(client_failure(e));
                }
            }
        }
    }

    /// Returns the stock taken by a failed create and drops its staged lines.
    async fn unwind_create(
        &self,
        order_id: OrderId,
        taken: &[Taken],
        cause: OrchestratorError,
    ) -> OrchestratorError {
        if !taken.is_empty() {
            tracing::warn!(%order_id, lines = taken.len(), error = %cause, "rolling back reserved stock");
        }

        let mut orphaned = Vec::new();
        for t in taken.iter().rev() {
            if let Some(key) = t.unsettled {
                match self.settle(key).await {
                    Ok(AdjustmentOutcome::Voided) => continue,
                    Ok(AdjustmentOutcome::Applied) => {}
                    Err(e) => {
                        orphaned.push((*t, format!("decrement {key} outcome unknown: {e}")));
                        continue;
                    }
                }
            }

            match self
                .apply_adjustment(StockAdjustment::restock(t.product_id, t.quantity))
                .await
            {
                Ok(()) => metrics::counter!("stock_compensations_total").increment(1),
                Err(f) => orphaned.push((*t, format!("restock failed: {}", f.error()))),
            }
        }

        if let Err(e) = self.store.discard_lines(order_id).await {
            tracing::warn!(%order_id, error = %e, "failed to discard staged lines");
        }

        if orphaned.is_empty() {
            return cause;
        }

        for (t, reason) in &orphaned {
            self.record(ReconciliationEntry::new(
                order_id,
                t.product_id,
                t.quantity,
                ReconciliationKind::OrphanedReservation,
                reason.clone(),
            ))
            .await;
        }
        metrics::counter!("orphaned_reservations_total").increment(orphaned.len() as u64);

        OrchestratorError::OrphanedReservation {
            order_id,
            lines: orphaned.len(),
        }
    }

    /// Loads a committed order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrchestratorError::OrderNotFound(order_id))
    }

    /// Lists committed orders by ascending id.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders().await?)
    }

    /// Lists lines whose stock needs manual reconciliation.
    pub async fn list_reconciliations(&self) -> Result<Vec<ReconciliationEntry>> {
        Ok(self.store.list_reconciliations().await?)
    }

    /// Moves an order to `status`.
    ///
    /// The write is a compare-and-set on the status read here, so of two
    /// concurrent updates only one applies. Cancelling returns the order's
    /// stock before the status is written: if any line cannot be restocked,
    /// the status is left unchanged, the line is logged for reconciliation
    /// and a later cancel or delete picks up the remaining lines.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let order = self.get_order(order_id).await?;
        order.status.validate_transition(status)?;

        if status != OrderStatus::Cancelled {
            if order.items.iter().any(|l| l.release_state != ReleaseState::Held) {
                return Err(OrchestratorError::CompensationFailed {
                    order_id,
                    reason: "an unfinished cancel already returned stock; cancel or delete the order"
                        .to_string(),
                });
            }
            self.write_status(order_id, order.status, status).await?;
            tracing::info!(%order_id, from = %order.status, to = %status, "order status changed");
            return Ok(());
        }

        let failures = self.release_lines(&order).await?;
        if !failures.is_empty() {
            for failure in failures.iter().filter(|f| !f.recorded) {
                self.record(ReconciliationEntry::new(
                    order_id,
                    failure.line.product_id,
                    failure.line.quantity,
                    ReconciliationKind::UnreleasedStock,
                    failure.reason.clone(),
                ))
                .await;
            }
            metrics::counter!("compensation_failures_total", "operation" => "cancel").increment(1);
            tracing::warn!(%order_id, failed = failures.len(), "cancel aborted, status unchanged");
            return Err(OrchestratorError::CompensationFailed {
                order_id,
                reason: describe(&failures),
            });
        }

        // Stock is back; follow the status to whatever it moved to meanwhile
        // as long as that status may still be cancelled.
        let mut from = order.status;
        loop {
            match self.write_status(order_id, from, status).await {
                Ok(()) => break,
                Err(OrchestratorError::InvalidTransition { from: actual, .. })
                    if actual != from && actual.validate_transition(status).is_ok() =>
                {
                    from = actual;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(%order_id, from = %from, to = %status, "order status changed");
        Ok(())
    }

    /// Compare-and-set of the order status.
    async fn write_status(&self, order_id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<()> {
        match self.store.transition_status(order_id, from, to).await {
            Ok(()) => Ok(()),
            Err(OrderStoreError::StatusConflict { actual, .. }) => {
                Err(OrchestratorError::InvalidTransition { from: actual, to })
            }
            Err(OrderStoreError::OrderNotFound(_)) => Err(OrchestratorError::OrderNotFound(order_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns an order's remaining stock and deletes it.
    ///
    /// Lines released earlier, for example by a cancel, are not restocked
    /// again. If any restock fails the order is kept so a later call can
    /// finish the job.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let order = self.get_order(order_id).await?;

        let failures = self.release_lines(&order).await?;
        if !failures.is_empty() {
            metrics::counter!("compensation_failures_total", "operation" => "delete").increment(1);
            tracing::warn!(%order_id, failed = failures.len(), "order kept, stock not returned");
            return Err(OrchestratorError::CompensationFailed {
                order_id,
                reason: describe(&failures),
            });
        }

        match self.store.delete_order(order_id).await {
            Ok(true) => {
                tracing::info!(%order_id, "order deleted");
                Ok(())
            }
            Ok(false) => Err(OrchestratorError::OrderNotFound(order_id)),
            Err(OrderStoreError::UnreleasedLines { count, .. }) => {
                Err(OrchestratorError::CompensationFailed {
                    order_id,
                    reason: format!("release in progress for {count} line(s)"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restocks every held line this call manages to claim.
    ///
    /// A line whose restock is known not to have applied goes back to held.
    /// A line whose restock outcome is unknown, or whose new state could not
    /// be saved, stays claimed so that no later call can restock it a second
    /// time, and is logged for reconciliation.
    async fn release_lines(&self, order: &Order) -> Result<Vec<ReleaseFailure>> {
        let mut failures = Vec::new();

        for line in order.unreleased_lines() {
            match self
                .store
                .begin_line_release(order.id, line.line_number)
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                // The line vanished, so a concurrent delete removed the order.
                Err(OrderStoreError::LineStateConflict { .. }) => {
                    return Err(OrchestratorError::OrderNotFound(order.id));
                }
                Err(e) => return Err(e.into()),
            }

            let restock = StockAdjustment::restock(line.product_id, line.quantity);
            let stuck = match self.apply_adjustment(restock).await {
                Ok(()) => {
                    metrics::counter!("stock_compensations_total").increment(1);
                    match self
                        .store
                        .finish_line_release(order.id, line.line_number)
                        .await
                    {
                        Ok(()) => None,
                        Err(e) => Some(format!(
                            "restock {} applied but line state not saved: {e}",
                            restock.key
                        )),
                    }
                }
                Err(AdjustFailure::NotApplied(e)) => {
                    match self
                        .store
                        .abort_line_release(order.id, line.line_number)
                        .await
                    {
                        Ok(()) => {
                            failures.push(ReleaseFailure {
                                line: line.clone(),
                                reason: format!("restock failed: {e}"),
                                recorded: false,
                            });
                            None
                        }
                        Err(store_err) => Some(format!(
                            "restock failed: {e}; line left claimed: {store_err}"
                        )),
                    }
                }
                Err(AdjustFailure::Unknown(e)) => {
                    Some(format!("restock {} outcome unknown: {e}", restock.key))
                }
            };

            // The line stays claimed, so only reconciliation can settle it.
            if let Some(reason) = stuck {
                self.record(ReconciliationEntry::new(
                    order.id,
                    line.product_id,
                    line.quantity,
                    ReconciliationKind::UnreleasedStock,
                    reason.clone(),
                ))
                .await;
                failures.push(ReleaseFailure {
                    line: line.clone(),
                    reason,
                    recorded: true,
                });
            }
        }
        Ok(failures)
    }

    async fn fetch_product(&self, product_id: ProductId) -> Result<Product> {
        self.config
            .retry
            .run("get_product", self.config.call_timeout, || {
                self.inventory.get_product(product_id)
            })
            .await
            .map_err(client_failure)
    }

    /// Sends an adjustment, settling an unknown outcome with a resolve.
    ///
    /// Retries reuse the adjustment's key, so they never apply twice.
    async fn apply_adjustment(
        &self,
        adjustment: StockAdjustment,
    ) -> std::result::Result<(), AdjustFailure> {
        let sent = self
            .config
            .retry
            .run("adjust_stock", self.config.call_timeout, || {
                self.inventory.adjust_stock(adjustment)
            })
            .await;

        match sent {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => {
                tracing::warn!(key = %adjustment.key, error = %e, "adjustment outcome unknown, resolving");
                match self.settle(adjustment.key).await {
                    Ok(AdjustmentOutcome::Applied) => Ok(()),
                    Ok(AdjustmentOutcome::Voided) => Err(AdjustFailure::NotApplied(e)),
                    Err(resolve_err) => {
                        tracing::error!(
                            key = %adjustment.key,
                            error = %resolve_err,
                            "could not resolve adjustment"
                        );
                        Err(AdjustFailure::Unknown(e))
                    }
                }
            }
            Err(e) => Err(AdjustFailure::NotApplied(e)),
        }
    }

    async fn settle(&self, key: AdjustmentKey) -> std::result::Result<AdjustmentOutcome, ClientError> {
        self.config
            .retry
            .run("resolve_adjustment", self.config.call_timeout, || {
                self.inventory.resolve_adjustment(key)
            })
            .await
    }

    /// Writes a reconciliation entry. A failed write is logged; the entry is
    /// always logged at error level.
    async fn record(&self, entry: ReconciliationEntry) {
        tracing::error!(
            order_id = %entry.order_id,
            product_id = %entry.product_id,
            quantity = entry.quantity,
            kind = %entry.kind,
            reason = %entry.reason,
            "stock needs reconciliation"
        );
        if let Err(e) = self.store.record_reconciliation(&entry).await {
            tracing::error!(entry_id = %entry.id, error = %e, "failed to record reconciliation entry");
        }
    }
}

impl<S, I> OrderOrchestrator<S, I>
where
    S: OrderStore + 'static,
    I: InventoryClient + 'static,
{
    /// Runs [`create_order`](Self::create_order) on its own task.
    ///
    /// Dropping the returned future does not stop the workflow, so a
    /// disconnecting caller can never interrupt a rollback half way. The
    /// same holds for the other `spawn_` variants below.
    pub async fn spawn_create_order(
        self: &Arc<Self>,
        customer_id: CustomerId,
        lines: Vec<LineRequest>,
    ) -> Result<OrderId> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.create_order(customer_id, &lines).await })
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?
    }

    /// Runs [`update_order_status`](Self::update_order_status) on its own task.
    pub async fn spawn_update_order_status(
        self: &Arc<Self>,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.update_order_status(order_id, status).await })
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?
    }

    /// Runs [`delete_order`](Self::delete_order) on its own task.
    pub async fn spawn_delete_order(self: &Arc<Self>, order_id: OrderId) -> Result<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.delete_order(order_id).await })
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?
    }
}

fn client_failure(err: ClientError) -> OrchestratorError {
    match err {
        ClientError::ProductNotFound(id) => OrchestratorError::ProductNotFound(id),
        ClientError::InsufficientStock {
            product_id,
            requested,
            available,
        } => OrchestratorError::InsufficientStock {
            product_id,
            requested,
            available,
        },
        ClientError::Rejected(msg) => OrchestratorError::InvalidRequest(msg),
        e @ (ClientError::AdjustmentVoided(_) | ClientError::Transport(_) | ClientError::Timeout) => {
            OrchestratorError::TransportFailure(e.to_string())
        }
    }
}

fn failure_label(err: &OrchestratorError) -> &'static str {
    match err {
        OrchestratorError::InvalidRequest(_) => "invalid_request",
        OrchestratorError::ProductNotFound(_) => "product_not_found",
        OrchestratorError::InsufficientStock { .. } => "insufficient_stock",
        OrchestratorError::TransportFailure(_) => "transport",
        OrchestratorError::OrphanedReservation { .. } => "orphaned_reservation",
        OrchestratorError::Store(_) => "store",
        _ => "other",
    }
}

fn describe(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("line {}: {}", f.line.line_number, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
