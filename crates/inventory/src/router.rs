//! Catalog HTTP endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentReceipt, NewProduct, Product, StockAdjustment};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::wire::{AdjustStockRequest, CreateProductRequest, ErrorBody, ResolveResponse};
use crate::{InventoryError, InventoryStore};

/// Wraps [`InventoryError`] for HTTP responses.
#[derive(Debug)]
pub struct CatalogError(pub InventoryError);

impl From<InventoryError> for CatalogError {
    fn from(err: InventoryError) -> Self {
        CatalogError(err)
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InventoryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            InventoryError::InsufficientStock { .. } | InventoryError::AdjustmentVoided(_) => {
                StatusCode::CONFLICT
            }
            InventoryError::InvalidProduct(_) | InventoryError::InvalidAdjustment(_) => {
                StatusCode::BAD_REQUEST
            }
            InventoryError::Corrupt(_)
            | InventoryError::Database(_)
            | InventoryError::Migration(_) => {
                tracing::error!(error = %self.0, "catalog request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Builds the catalog router over a shared store.
pub fn create_router<S: InventoryStore + 'static>(store: Arc<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products", post(create_product::<S>).get(list_products::<S>))
        .route("/products/{id}", get(get_product::<S>))
        .route("/products/{id}/adjustments", post(adjust_stock::<S>))
        .route("/adjustments/{key}/resolve", post(resolve_adjustment::<S>))
        .with_state(store)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[tracing::instrument(skip(store, req))]
async fn create_product<S: InventoryStore + 'static>(
    State(store): State<Arc<S>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), CatalogError> {
    let product = store
        .add_product(NewProduct::new(req.name, req.stock_quantity, req.unit_price))
        .await?;
    tracing::info!(product_id = %product.id, "product added");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products<S: InventoryStore + 'static>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<Product>>, CatalogError> {
    Ok(Json(store.list_products().await?))
}

async fn get_product<S: InventoryStore + 'static>(
    State(store): State<Arc<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, CatalogError> {
    let product_id = ProductId::new(id);
    store
        .get_product(product_id)
        .await?
        .map(Json)
        .ok_or(CatalogError(InventoryError::ProductNotFound(product_id)))
}

#[tracing::instrument(skip(store))]
async fn adjust_stock<S: InventoryStore + 'static>(
    State(store): State<Arc<S>>,
    Path(id): Path<i64>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<AdjustmentReceipt>, CatalogError> {
    let receipt = store
        .adjust_stock(StockAdjustment {
            product_id: ProductId::new(id),
            delta: req.delta,
            key: req.key,
        })
        .await?;
    Ok(Json(receipt))
}

#[tracing::instrument(skip(store))]
async fn resolve_adjustment<S: InventoryStore + 'static>(
    State(store): State<Arc<S>>,
    Path(key): Path<AdjustmentKey>,
) -> Result<Json<ResolveResponse>, CatalogError> {
    let outcome = store.resolve_adjustment(key).await?;
    tracing::info!(%key, %outcome, "adjustment resolved");
    Ok(Json(ResolveResponse { outcome }))
}
