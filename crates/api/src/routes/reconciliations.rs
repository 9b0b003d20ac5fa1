//! Reconciliation log endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use orchestrator::InventoryClient;
use order_store::{OrderStore, ReconciliationEntry};

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// GET /reconciliations: stock the order side could not return, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
) -> Result<Json<Vec<ReconciliationEntry>>, ApiError> {
    Ok(Json(state.orchestrator.list_reconciliations().await?))
}
