//! HTTP handlers for cart endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::CartService;
use crate::AppState;
use shared::models::{Cart, CartTotals, CouponValidation};
use shared::types::OwnerRef;

/// Input for fetching or creating the owner's active cart
#[derive(Debug, Deserialize)]
pub struct GetOrCreateCartInput {
    pub owner: OwnerRef,
    pub currency: String,
}

/// Input for adding a line to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// Input for changing a line's quantity
#[derive(Debug, Deserialize)]
pub struct UpdateItemInput {
    pub quantity: i32,
}

/// Input for applying a coupon
#[derive(Debug, Deserialize)]
pub struct ApplyCouponInput {
    pub code: String,
}

/// Cart response with recomputed totals
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub totals: CartTotals,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let totals = cart.totals();
        CartResponse { cart, totals }
    }
}

/// Coupon application outcome; `valid: false` is a normal 200 response
#[derive(Debug, Serialize)]
pub struct ApplyCouponResponse {
    pub validation: CouponValidation,
    #[serde(flatten)]
    pub cart: CartResponse,
}

/// Fetch or lazily create the owner's active cart
pub async fn get_or_create_cart(
    State(state): State<AppState>,
    Json(input): Json<GetOrCreateCartInput>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service.get_or_create(&input.owner, &input.currency).await?;
    Ok(Json(cart.into()))
}

/// Fetch a cart by id
pub async fn get_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service.get(cart_id).await?;
    Ok(Json(cart.into()))
}

/// Add an item to a cart (merge-by-variant)
pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service
        .add_item(cart_id, input.variant_id, input.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Update a line's quantity; zero removes the line
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path((_cart_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service.update_item_quantity(item_id, input.quantity).await?;
    Ok(Json(cart.into()))
}

/// Remove a line from a cart
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path((_cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service.remove_item(item_id).await?;
    Ok(Json(cart.into()))
}

/// Apply a coupon code to a cart
pub async fn apply_coupon(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<ApplyCouponInput>,
) -> AppResult<Json<ApplyCouponResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let (cart, validation) = service.apply_coupon(cart_id, &input.code).await?;
    Ok(Json(ApplyCouponResponse {
        validation,
        cart: cart.into(),
    }))
}

/// Remove any applied coupon from a cart (idempotent)
pub async fn remove_coupon(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<CartResponse>> {
    let service = CartService::new(state.db, &state.config.checkout);
    let cart = service.remove_coupon(cart_id).await?;
    Ok(Json(cart.into()))
}
