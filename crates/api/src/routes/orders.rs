//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use domain::{LineRequest, Order, OrderLine, OrderStatus};
use order_store::OrderStore;
use orchestrator::{InventoryClient, OrderOrchestrator};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore, I: InventoryClient> {
    pub orchestrator: Arc<OrderOrchestrator<S, I>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub line_number: u32,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub release_state: String,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
}

#[derive(Serialize)]
pub struct StatusUpdatedResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl From<&OrderLine> for OrderItemResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            line_number: line.line_number.as_u32(),
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            release_state: line.release_state.to_string(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            created_at: order.created_at,
            total_cents: order.total_amount().cents(),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /orders: reserves stock for every item and creates the order.
///
/// The workflow runs on its own task, so a client hanging up mid-request
/// does not interrupt a rollback.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id, items = req.items.len()))]
pub async fn create<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let lines = req
        .items
        .iter()
        .map(|item| LineRequest::new(item.product_id, item.quantity))
        .collect();

    let order_id = state
        .orchestrator
        .spawn_create_order(req.customer_id, lines)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderCreatedResponse { order_id })))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orchestrator.get_order(order_id).await?;
    Ok(Json(order.into()))
}

/// GET /orders: every order by ascending id.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orchestrator.list_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// PUT /orders/{id}/status
///
/// Runs detached like create, since a cancel returns stock.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusUpdatedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: domain::DomainError| ApiError::BadRequest(e.to_string()))?;

    state
        .orchestrator
        .spawn_update_order_status(order_id, status)
        .await?;

    Ok(Json(StatusUpdatedResponse { order_id, status }))
}

/// DELETE /orders/{id}: returns the order's stock, then removes it.
///
/// Runs detached, so a claimed line is never left mid-release by a client
/// hanging up.
#[tracing::instrument(skip(state))]
pub async fn delete<S: OrderStore + 'static, I: InventoryClient + 'static>(
    State(state): State<Arc<AppState<S, I>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.orchestrator.spawn_delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse::<i64>()
        .map(OrderId::new)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id {id:?}: {e}")))
}
