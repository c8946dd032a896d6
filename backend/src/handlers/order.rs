//! HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{payment::PaymentIntent, PaymentClient};
use crate::services::order::PlaceOrderInput;
use crate::services::OrderService;
use crate::AppState;
use shared::models::{Order, OrderStatus, OrderStatusHistoryEntry};
use shared::types::{PaginatedResponse, Pagination};

/// Input for a status transition
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: OrderStatus,
    pub actor: String,
    pub reason: Option<String>,
}

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Uuid,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Place an order from an active cart
pub async fn place_order(
    State(state): State<AppState>,
    Json(input): Json<PlaceOrderInput>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db, &state.config.checkout);
    let order = service.place_order(input).await?;
    Ok(Json(order))
}

/// Fetch an order by id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db, &state.config.checkout);
    let order = service.get_order(order_id).await?;
    Ok(Json(order))
}

/// List a user's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<Json<PaginatedResponse<Order>>> {
    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };
    let service = OrderService::new(state.db, &state.config.checkout);
    let orders = service.list_orders(query.user_id, &pagination).await?;
    Ok(Json(orders))
}

/// Status transition audit trail for an order
pub async fn get_status_history(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<OrderStatusHistoryEntry>>> {
    let service = OrderService::new(state.db, &state.config.checkout);
    let history = service.status_history(order_id).await?;
    Ok(Json(history))
}

/// Transition an order's status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db, &state.config.checkout);
    let order = service
        .update_status(order_id, input.status, &input.actor, input.reason.as_deref())
        .await?;
    Ok(Json(order))
}

/// Create a payment intent for a placed order's frozen total
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PaymentIntent>> {
    let service = OrderService::new(state.db.clone(), &state.config.checkout);
    let order = service.get_order(order_id).await?;

    if order.status != OrderStatus::PendingPayment {
        return Err(AppError::BusinessRule(format!(
            "Order {} is not awaiting payment",
            order.order_number
        )));
    }

    let gateway = PaymentClient::new(&state.config.payment);
    let intent = gateway
        .create_payment_intent(order.total, &order.currency, &order.order_number)
        .await?;
    Ok(Json(intent))
}
