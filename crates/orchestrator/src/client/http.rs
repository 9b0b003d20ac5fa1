use std::time::Duration;

use async_trait::async_trait;
use common::{AdjustmentKey, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, Product, StockAdjustment};
use inventory::wire::{AdjustStockRequest, ErrorBody, ResolveResponse, codes};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{ClientError, InventoryClient};

/// Inventory client speaking JSON to the catalog service.
///
/// Holds a single `reqwest::Client`, so connections are pooled across calls.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client for the catalog at `base_url` with a per-request
    /// timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport);
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::Transport(format!("catalog responded {status}")));
    }

    let body: ErrorBody = response.json().await.map_err(|e| {
        ClientError::Rejected(format!("catalog responded {status} with unreadable body: {e}"))
    })?;
    Err(from_error_body(body))
}

fn from_error_body(body: ErrorBody) -> ClientError {
    match (body.error.as_str(), body.product_id, body.key) {
        (codes::PRODUCT_NOT_FOUND, Some(id), _) => ClientError::ProductNotFound(id),
        (codes::INSUFFICIENT_STOCK, Some(product_id), _) => ClientError::InsufficientStock {
            product_id,
            requested: body.requested.unwrap_or_default(),
            available: body.available.unwrap_or_default(),
        },
        (codes::ADJUSTMENT_VOIDED, _, Some(key)) => ClientError::AdjustmentVoided(key),
        _ => ClientError::Rejected(body.message),
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    #[tracing::instrument(skip(self))]
    async fn get_product(&self, product_id: ProductId) -> Result<Product, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/products/{product_id}")))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    #[tracing::instrument(skip(self), fields(product_id = %adjustment.product_id, delta = adjustment.delta))]
    async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
    ) -> Result<AdjustmentReceipt, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/products/{}/adjustments", adjustment.product_id)))
            .json(&AdjustStockRequest {
                delta: adjustment.delta,
                key: adjustment.key,
            })
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_adjustment(
        &self,
        key: AdjustmentKey,
    ) -> Result<AdjustmentOutcome, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/adjustments/{key}/resolve")))
            .send()
            .await
            .map_err(transport)?;
        let resolved: ResolveResponse = decode(response).await?;
        Ok(resolved.outcome)
    }
}
