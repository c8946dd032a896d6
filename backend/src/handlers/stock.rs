//! HTTP handlers for stock ledger and availability endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::{AvailabilityService, StockLedgerService};
use crate::AppState;
use shared::models::{AvailabilityResult, ReservationSource, StockItem, StockMovement, StockReservation};
use shared::types::EntityRef;

/// Input for a stock adjustment
#[derive(Debug, Deserialize)]
pub struct AdjustStockInput {
    pub variant_id: Uuid,
    pub warehouse_id: Uuid,
    pub delta: i64,
    pub reason_code: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

/// Input for setting safety stock
#[derive(Debug, Deserialize)]
pub struct SafetyStockInput {
    pub variant_id: Uuid,
    pub warehouse_id: Uuid,
    pub safety_stock: i64,
}

/// Input for an availability check
#[derive(Debug, Deserialize)]
pub struct AvailabilityCheckInput {
    pub demands: Vec<DemandLine>,
    pub exclude_reservation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DemandLine {
    pub variant_id: Uuid,
    pub quantity: i64,
}

/// Input for creating a reservation directly
#[derive(Debug, Deserialize)]
pub struct CreateReservationInput {
    pub variant_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub quantity: i64,
    pub source_type: ReservationSource,
    pub source_id: Uuid,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub expired: u64,
}

/// A warehouse whose materialized quantity disagrees with its movement log
#[derive(Serialize)]
pub struct DriftEntry {
    pub warehouse_id: Uuid,
    pub cached_quantity: i64,
    pub movement_sum: i64,
}

/// Record a stock adjustment
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(input): Json<AdjustStockInput>,
) -> AppResult<Json<StockItem>> {
    let service = StockLedgerService::new(state.db);
    let reference = match (input.reference_type, input.reference_id) {
        (Some(ref_type), Some(ref_id)) => Some(EntityRef::new(ref_type, ref_id)),
        _ => None,
    };
    let item = service
        .adjust(
            input.variant_id,
            input.warehouse_id,
            input.delta,
            &input.reason_code,
            reference,
        )
        .await?;
    Ok(Json(item))
}

/// Set the safety stock buffer for a (variant, warehouse) pair
pub async fn set_safety_stock(
    State(state): State<AppState>,
    Json(input): Json<SafetyStockInput>,
) -> AppResult<Json<StockItem>> {
    let service = StockLedgerService::new(state.db);
    let item = service
        .set_safety_stock(input.variant_id, input.warehouse_id, input.safety_stock)
        .await?;
    Ok(Json(item))
}

/// Check availability for a set of demands
pub async fn check_availability(
    State(state): State<AppState>,
    Json(input): Json<AvailabilityCheckInput>,
) -> AppResult<Json<Vec<AvailabilityResult>>> {
    let service = AvailabilityService::new(state.db);
    let demand: Vec<(Uuid, i64)> = input
        .demands
        .iter()
        .map(|d| (d.variant_id, d.quantity))
        .collect();
    let results = service.check(&demand, input.exclude_reservation_id).await?;
    Ok(Json(results))
}

/// Create a stock reservation with the configured TTL
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(input): Json<CreateReservationInput>,
) -> AppResult<Json<StockReservation>> {
    let ttl = chrono::Duration::minutes(state.config.checkout.reservation_ttl_minutes);
    let service = StockLedgerService::new(state.db);
    let reservation = service
        .reserve(crate::services::stock::ReserveInput {
            variant_id: input.variant_id,
            warehouse_id: input.warehouse_id,
            quantity: input.quantity,
            source: input.source_type,
            source_id: input.source_id,
            ttl: Some(ttl),
        })
        .await?;
    Ok(Json(reservation))
}

/// Release a reservation (idempotent)
pub async fn release_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let service = StockLedgerService::new(state.db);
    service.release(reservation_id).await?;
    Ok(Json(serde_json::json!({ "released": true })))
}

/// Run the reservation expiry sweep
pub async fn sweep_reservations(State(state): State<AppState>) -> AppResult<Json<SweepResponse>> {
    let service = StockLedgerService::new(state.db);
    let expired = service.expire_due().await?;
    Ok(Json(SweepResponse { expired }))
}

/// Movement log for a variant
pub async fn get_movements(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = StockLedgerService::new(state.db);
    let movements = service.movements(variant_id, None).await?;
    Ok(Json(movements))
}

/// Ledger consistency check for a variant; an empty list means healthy
pub async fn get_ledger_drift(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> AppResult<Json<Vec<DriftEntry>>> {
    let service = StockLedgerService::new(state.db);
    let drift = service
        .ledger_drift(variant_id)
        .await?
        .into_iter()
        .map(|(warehouse_id, cached_quantity, movement_sum)| DriftEntry {
            warehouse_id,
            cached_quantity,
            movement_sum,
        })
        .collect();
    Ok(Json(drift))
}

/// Stock items for a variant across warehouses
pub async fn get_stock_items(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockItem>>> {
    let service = StockLedgerService::new(state.db);
    let items = service.items(variant_id).await?;
    Ok(Json(items))
}
