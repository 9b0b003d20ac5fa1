//! Integration tests for order workflows against the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, Money, OrderId, ProductId};
use domain::{LineRequest, NewProduct, OrderStatus, ReleaseState};
use futures_util::future::join_all;
use inventory::{InMemoryInventoryStore, InventoryStore};
use order_store::{InMemoryOrderStore, OrderStore, ReconciliationKind};
use orchestrator::{
    HttpInventoryClient, LocalInventoryClient, OrchestratorConfig, OrchestratorError,
    OrderOrchestrator, RetryPolicy,
};

type TestOrchestrator =
    OrderOrchestrator<InMemoryOrderStore, LocalInventoryClient<InMemoryInventoryStore>>;

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        call_timeout: Duration::from_millis(250),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        reservation_attempts: 3,
    }
}

struct TestHarness {
    orchestrator: Arc<TestOrchestrator>,
    catalog: Arc<InMemoryInventoryStore>,
    client: LocalInventoryClient<InMemoryInventoryStore>,
    orders: InMemoryOrderStore,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(fast_config())
    }

    fn with_config(config: OrchestratorConfig) -> Self {
        let catalog = Arc::new(InMemoryInventoryStore::new());
        let client = LocalInventoryClient::new(catalog.clone());
        let orders = InMemoryOrderStore::new();
        let orchestrator = Arc::new(OrderOrchestrator::with_config(
            orders.clone(),
            client.clone(),
            config,
        ));
        Self {
            orchestrator,
            catalog,
            client,
            orders,
        }
    }

    async fn product(&self, name: &str, stock: u32, cents: i64) -> ProductId {
        self.catalog
            .add_product(NewProduct::new(name, stock, Money::from_cents(cents)))
            .await
            .unwrap()
            .id
    }

    async fn stock(&self, id: ProductId) -> u32 {
        self.catalog.stock_of(id).await.unwrap()
    }

    async fn order(&self, lines: &[(ProductId, u32)]) -> Result<OrderId, OrchestratorError> {
        let lines: Vec<LineRequest> = lines
            .iter()
            .map(|&(p, q)| LineRequest::new(p, q))
            .collect();
        self.orchestrator
            .create_order(CustomerId::new(1), &lines)
            .await
    }

    /// Stock on the shelf plus stock held by live orders.
    async fn accounted(&self, id: ProductId) -> u64 {
        let held: u64 = self
            .orchestrator
            .list_orders()
            .await
            .unwrap()
            .iter()
            .map(|o| o.reserved_quantity(id))
            .sum();
        u64::from(self.stock(id).await) + held
    }
}

#[tokio::test]
async fn test_scenario_a_second_order_cannot_oversell() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;

    h.order(&[(p, 4)]).await.unwrap();
    assert_eq!(h.stock(p).await, 6);

    let err = h.order(&[(p, 7)]).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InsufficientStock {
            requested: 7,
            available: 6,
            ..
        }
    ));
    assert_eq!(h.stock(p).await, 6);
}

#[tokio::test]
async fn test_scenario_a_concurrent_orders() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;

    let (lines_a, lines_b) = ([(p, 4)], [(p, 7)]);
    let (a, b) = tokio::join!(h.order(&lines_a), h.order(&lines_b));
    assert!(a.is_ok() != b.is_ok(), "exactly one order must succeed");
    let expected = if a.is_ok() { 6 } else { 3 };
    assert_eq!(h.stock(p).await, expected);
}

#[tokio::test]
async fn test_scenario_b_failed_line_rolls_back_earlier_lines() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let q = h.product("Gadget", 1, 2500).await;

    let err = h.order(&[(p, 4), (q, 2)]).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InsufficientStock { product_id, .. } if product_id == q
    ));

    assert_eq!(h.stock(p).await, 10);
    assert_eq!(h.stock(q).await, 1);
    assert!(h.orchestrator.list_orders().await.unwrap().is_empty());
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_unknown_product_rolls_back() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;

    let err = h
        .order(&[(p, 2), (ProductId::new(404), 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ProductNotFound(_)));
    assert_eq!(h.stock(p).await, 10);
    assert!(h.orchestrator.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_c_delete_restocks() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();
    assert_eq!(h.stock(p).await, 6);

    h.orchestrator.delete_order(id).await.unwrap();

    assert_eq!(h.stock(p).await, 10);
    assert!(matches!(
        h.orchestrator.get_order(id).await,
        Err(OrchestratorError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn test_scenario_d_fulfilled_is_terminal() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 1)]).await.unwrap();

    h.orchestrator
        .update_order_status(id, OrderStatus::Processing)
        .await
        .unwrap();
    h.orchestrator
        .update_order_status(id, OrderStatus::Fulfilled)
        .await
        .unwrap();

    let err = h
        .orchestrator
        .update_order_status(id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidTransition {
            from: OrderStatus::Fulfilled,
            to: OrderStatus::Pending
        }
    ));
    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
}

#[tokio::test]
async fn test_delete_twice_restocks_once() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.orchestrator.delete_order(id).await.unwrap();
    let err = h.orchestrator.delete_order(id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::OrderNotFound(_)));
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_cancel_then_delete_restocks_once() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.orchestrator
        .update_order_status(id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(h.stock(p).await, 10);

    h.orchestrator.delete_order(id).await.unwrap();
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_concurrent_deletes_never_double_restock() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4), (p, 2)]).await.unwrap();
    assert_eq!(h.stock(p).await, 4);

    let results = join_all((0..5).map(|_| h.orchestrator.delete_order(id))).await;
    assert!(results.iter().any(Result::is_ok));
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_concurrent_creates_never_oversell() {
    let h = TestHarness::new();
    let p = h.product("Widget", 25, 1000).await;

    let lines = [(p, 3)];
    let results = join_all((0..20).map(|_| h.order(&lines))).await;
    let created = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(created, 8);
    assert_eq!(h.stock(p).await, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, OrchestratorError::InsufficientStock { .. }))
    );
}

#[tokio::test]
async fn test_stock_is_conserved_across_workflows() {
    let h = TestHarness::new();
    let p = h.product("Widget", 50, 1000).await;
    let q = h.product("Gadget", 20, 2500).await;

    let mut ids = Vec::new();
    for i in 0..6u32 {
        ids.push(h.order(&[(p, i + 1), (q, 2)]).await.unwrap());
    }
    let _ = h.order(&[(p, 1), (q, 100)]).await.unwrap_err();
    assert_eq!(h.accounted(p).await, 50);
    assert_eq!(h.accounted(q).await, 20);

    h.orchestrator
        .update_order_status(ids[0], OrderStatus::Cancelled)
        .await
        .unwrap();
    h.orchestrator.delete_order(ids[0]).await.unwrap();
    h.orchestrator.delete_order(ids[1]).await.unwrap();
    h.orchestrator
        .update_order_status(ids[2], OrderStatus::Processing)
        .await
        .unwrap();
    h.orchestrator
        .update_order_status(ids[2], OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(h.accounted(p).await, 50);
    assert_eq!(h.accounted(q).await, 20);

    let tasks = ids[3..]
        .iter()
        .map(|&id| h.orchestrator.delete_order(id));
    for result in join_all(tasks).await {
        result.unwrap();
    }
    assert_eq!(h.stock(p).await, 50);
    assert_eq!(h.stock(q).await, 20);
    assert_eq!(h.catalog.total_stock().await, 70);
    assert!(h.orchestrator.list_reconciliations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_status_updates_apply_once() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    let (a, b) = tokio::join!(
        h.orchestrator.update_order_status(id, OrderStatus::Cancelled),
        h.orchestrator.update_order_status(id, OrderStatus::Cancelled)
    );
    assert!(a.is_ok() != b.is_ok());
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser,
        Err(OrchestratorError::InvalidTransition {
            from: OrderStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_failed_rollback_reports_orphaned_reservation() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let q = h.product("Gadget", 5, 2500).await;
    h.client.set_fail_restocks(true);

    let err = h.order(&[(p, 4), (q, 9)]).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::OrphanedReservation { lines: 1, .. }
    ));
    assert_eq!(h.stock(p).await, 6);
    assert!(h.orchestrator.list_orders().await.unwrap().is_empty());

    let entries = h.orchestrator.list_reconciliations().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ReconciliationKind::OrphanedReservation);
    assert_eq!(entries[0].product_id, p);
    assert_eq!(entries[0].quantity, 4);
}

#[tokio::test]
async fn test_failed_restock_keeps_order_on_delete() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.client.set_fail_restocks(true);
    let err = h.orchestrator.delete_order(id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.items[0].release_state, ReleaseState::Held);
    assert_eq!(h.stock(p).await, 6);

    h.client.set_fail_restocks(false);
    h.orchestrator.delete_order(id).await.unwrap();
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_failed_cancel_records_and_delete_resumes() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.client.set_fail_restocks(true);
    let err = h
        .orchestrator
        .update_order_status(id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items[0].release_state, ReleaseState::Held);
    assert_eq!(h.stock(p).await, 6);

    let entries = h.orchestrator.list_reconciliations().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ReconciliationKind::UnreleasedStock);

    h.client.set_fail_restocks(false);
    h.orchestrator.delete_order(id).await.unwrap();
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_partial_cancel_blocks_other_transitions() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let q = h.product("Gadget", 5, 2500).await;
    let id = h.order(&[(q, 2), (p, 4)]).await.unwrap();

    h.client.fail_product(p).await;
    let err = h
        .orchestrator
        .update_order_status(id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items[0].release_state, ReleaseState::Released);
    assert_eq!(order.items[1].release_state, ReleaseState::Held);
    assert_eq!(h.accounted(q).await, 5);
    assert_eq!(h.accounted(p).await, 10);

    let err = h
        .orchestrator
        .update_order_status(id, OrderStatus::Processing)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    h.client.heal_product(p).await;
    h.orchestrator
        .update_order_status(id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(h.stock(p).await, 10);
    assert_eq!(h.stock(q).await, 5);
    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_unsaved_release_is_recorded_not_repeated() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.orders.set_fail_release_updates(true);
    let err = h.orchestrator.delete_order(id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    // The restock went through; only the line state was lost.
    assert_eq!(h.stock(p).await, 10);
    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.items[0].release_state, ReleaseState::Releasing);
    let entries = h.orchestrator.list_reconciliations().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ReconciliationKind::UnreleasedStock);
    assert_eq!(entries[0].quantity, 4);

    h.orders.set_fail_release_updates(false);
    let err = h.orchestrator.delete_order(id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));
    assert_eq!(h.stock(p).await, 10);
    assert_eq!(h.orchestrator.list_reconciliations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsaved_abort_is_recorded() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();

    h.client.set_fail_restocks(true);
    h.orders.set_fail_release_updates(true);
    let err = h
        .orchestrator
        .update_order_status(id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CompensationFailed { .. }));

    assert_eq!(h.stock(p).await, 6);
    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items[0].release_state, ReleaseState::Releasing);
    assert_eq!(h.orchestrator.list_reconciliations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_error_after_write_keeps_order() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    h.orders.set_fail_after_commit(true);

    let id = h.order(&[(p, 4)]).await.unwrap();

    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.items[0].release_state, ReleaseState::Held);
    assert_eq!(h.stock(p).await, 6);
    assert_eq!(h.accounted(p).await, 10);
    assert!(h.orchestrator.list_reconciliations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_inventory_surfaces_transport_failure() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    h.client.fail_product(p).await;

    let err = h.order(&[(p, 1)]).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TransportFailure(_)));
    assert_eq!(h.stock(p).await, 10);
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_slow_inventory_times_out() {
    let h = TestHarness::with_config(OrchestratorConfig {
        call_timeout: Duration::from_millis(20),
        retry: RetryPolicy::none(),
        reservation_attempts: 3,
    });
    let p = h.product("Widget", 10, 1000).await;
    h.client.set_latency(Duration::from_millis(200));

    let err = h.order(&[(p, 1)]).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TransportFailure(_)));
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_unresolvable_decrement_is_orphaned() {
    let h = TestHarness::with_config(OrchestratorConfig {
        retry: RetryPolicy::none(),
        ..fast_config()
    });
    let p = h.product("Widget", 10, 1000).await;
    h.client.time_out_after_apply(1);
    h.client.set_fail_resolves(true);

    let err = h.order(&[(p, 4)]).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::OrphanedReservation { lines: 1, .. }
    ));
    // The decrement did apply; it is recorded rather than guessed at.
    assert_eq!(h.stock(p).await, 6);
    let entries = h.orchestrator.list_reconciliations().await.unwrap();
    assert_eq!(entries[0].kind, ReconciliationKind::OrphanedReservation);
}

#[tokio::test]
async fn test_spawned_create_survives_dropped_caller() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    h.client.set_latency(Duration::from_millis(20));

    let orchestrator = h.orchestrator.clone();
    let caller = tokio::spawn(async move {
        orchestrator
            .spawn_create_order(CustomerId::new(1), vec![LineRequest::new(p, 4)])
            .await
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    caller.abort();

    // The detached workflow still completes.
    for _ in 0..100 {
        if h.orders.order_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.orders.order_count().await, 1);
    assert_eq!(h.stock(p).await, 6);
}

#[tokio::test]
async fn test_spawned_delete_survives_dropped_caller() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();
    h.client.set_latency(Duration::from_millis(50));

    // The caller gives up while the restock is in flight.
    let dropped =
        tokio::time::timeout(Duration::from_millis(10), h.orchestrator.spawn_delete_order(id))
            .await;
    assert!(dropped.is_err());

    for _ in 0..100 {
        if h.orders.order_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.orders.order_count().await, 0);
    assert_eq!(h.stock(p).await, 10);
    assert!(h.orchestrator.list_reconciliations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spawned_cancel_survives_dropped_caller() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let id = h.order(&[(p, 4)]).await.unwrap();
    h.client.set_latency(Duration::from_millis(50));

    let dropped = tokio::time::timeout(
        Duration::from_millis(10),
        h.orchestrator
            .spawn_update_order_status(id, OrderStatus::Cancelled),
    )
    .await;
    assert!(dropped.is_err());

    for _ in 0..100 {
        let order = h.orchestrator.get_order(id).await.unwrap();
        if order.status == OrderStatus::Cancelled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let order = h.orchestrator.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.unreleased_lines().count(), 0);
    assert_eq!(h.stock(p).await, 10);
}

#[tokio::test]
async fn test_list_orders_in_id_order_with_items() {
    let h = TestHarness::new();
    let p = h.product("Widget", 10, 1000).await;
    let q = h.product("Gadget", 10, 2500).await;

    let first = h.order(&[(p, 1), (q, 2)]).await.unwrap();
    let second = h.order(&[(q, 1)]).await.unwrap();

    let orders = h.orchestrator.list_orders().await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, first);
    assert_eq!(orders[1].id, second);
    assert_eq!(orders[0].items[0].product_id, p);
    assert_eq!(orders[0].items[1].product_id, q);
    assert_eq!(orders[0].total_amount(), Money::from_cents(1000 + 2 * 2500));
}

#[tokio::test]
async fn test_http_client_round_trip() {
    let catalog = Arc::new(InMemoryInventoryStore::new());
    let p = catalog
        .add_product(NewProduct::new("Widget", 10, Money::from_cents(1000)))
        .await
        .unwrap()
        .id;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = inventory::create_router(catalog.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = HttpInventoryClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let orders = InMemoryOrderStore::new();
    let orchestrator = OrderOrchestrator::with_config(orders.clone(), client, fast_config());

    let id = orchestrator
        .create_order(CustomerId::new(3), &[LineRequest::new(p, 4)])
        .await
        .unwrap();
    assert_eq!(catalog.stock_of(p).await, Some(6));

    let err = orchestrator
        .create_order(CustomerId::new(3), &[LineRequest::new(p, 7)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InsufficientStock {
            requested: 7,
            available: 6,
            ..
        }
    ));

    let missing = orchestrator
        .create_order(CustomerId::new(3), &[LineRequest::new(ProductId::new(99), 1)])
        .await
        .unwrap_err();
    assert!(matches!(missing, OrchestratorError::ProductNotFound(_)));

    orchestrator.delete_order(id).await.unwrap();
    assert_eq!(catalog.stock_of(p).await, Some(10));
    assert!(orders.get_order(id).await.unwrap().is_none());
}
