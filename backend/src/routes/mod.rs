//! Route definitions for the commerce transaction core

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stock ledger and availability
        .nest("/stock", stock_routes())
        // Carts
        .nest("/carts", cart_routes())
        // Orders
        .nest("/orders", order_routes())
}

/// Stock ledger routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/adjustments", post(handlers::adjust_stock))
        .route("/safety-stock", put(handlers::set_safety_stock))
        .route("/availability-checks", post(handlers::check_availability))
        .route("/reservations", post(handlers::create_reservation))
        .route(
            "/reservations/:reservation_id/release",
            post(handlers::release_reservation),
        )
        .route("/reservations/sweep", post(handlers::sweep_reservations))
        .route("/:variant_id/items", get(handlers::get_stock_items))
        .route("/:variant_id/movements", get(handlers::get_movements))
        .route("/:variant_id/drift", get(handlers::get_ledger_drift))
}

/// Cart routes
fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::get_or_create_cart))
        .route("/:cart_id", get(handlers::get_cart))
        .route("/:cart_id/items", post(handlers::add_cart_item))
        .route(
            "/:cart_id/items/:item_id",
            put(handlers::update_cart_item).delete(handlers::remove_cart_item),
        )
        .route(
            "/:cart_id/coupon",
            post(handlers::apply_coupon).delete(handlers::remove_coupon),
        )
}

/// Order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::place_order).get(handlers::list_orders))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/history", get(handlers::get_status_history))
        .route("/:order_id/status", post(handlers::update_order_status))
        .route(
            "/:order_id/payment-intent",
            post(handlers::create_payment_intent),
        )
}
