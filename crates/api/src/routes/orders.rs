//! Order placement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use coordinator::TransactionContext;
use serde::{Deserialize, Serialize};
use services::{Order, Store};

use super::{AppState, run_to_completion};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub username: String,
    pub pay_state: Option<String>,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            username: order.username,
            pay_state: order.pay_state.map(|s| s.to_string()),
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// POST /orders: place an order and process its payment.
#[tracing::instrument(skip(state, req), fields(username = %req.username))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    if req.username.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Username must not be empty".to_string(),
        ));
    }

    let order = run_to_completion(async move {
        let ctx = TransactionContext::new();
        state.orders.order(&ctx, Order::new(req.username)).await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: get a committed order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;

    let order = state
        .orders
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))?;

    Ok(Json(order.into()))
}
