//! HTTP API server for order orchestration.
//!
//! Exposes order create/read/status/delete endpoints backed by
//! [`OrderOrchestrator`], the reconciliation log, and health and Prometheus
//! metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use orchestrator::{InventoryClient, OrchestratorConfig, OrderOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, I>(state: Arc<AppState<S, I>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + 'static,
    I: InventoryClient + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list::<S, I>).post(routes::orders::create::<S, I>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S, I>).delete(routes::orders::delete::<S, I>),
        )
        .route(
            "/orders/{id}/status",
            put(routes::orders::update_status::<S, I>),
        )
        .route(
            "/reconciliations",
            get(routes::reconciliations::list::<S, I>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wraps an order store and inventory client into application state.
pub fn create_state<S, I>(store: S, inventory: I, config: OrchestratorConfig) -> Arc<AppState<S, I>>
where
    S: OrderStore,
    I: InventoryClient,
{
    Arc::new(AppState {
        orchestrator: Arc::new(OrderOrchestrator::with_config(store, inventory, config)),
    })
}
