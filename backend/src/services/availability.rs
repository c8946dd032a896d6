//! Availability checker: read-only aggregation over the stock ledger.
//!
//! Shares its arithmetic and reservation filtering with the reserving
//! transaction in the stock service, so a positive check here is exactly
//! what `reserve` will re-validate under lock.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::stock::{reserved_quantity, sellable_on_hand};
use shared::models::AvailabilityResult;
use shared::validation::{effective_available, is_sufficient};

/// Availability checker service
#[derive(Clone)]
pub struct AvailabilityService {
    db: PgPool,
}

impl AvailabilityService {
    /// Create a new AvailabilityService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Check whether each requested (variant, quantity) demand can be met.
    ///
    /// Per variant: sum on-hand minus safety stock across warehouses, minus
    /// all active non-expired reservations except `exclude_reservation`
    /// (used by requantify flows to ignore the hold being replaced). Never
    /// mutates state.
    pub async fn check(
        &self,
        demand: &[(Uuid, i64)],
        exclude_reservation: Option<Uuid>,
    ) -> AppResult<Vec<AvailabilityResult>> {
        let mut conn = self.db.acquire().await?;
        let mut results = Vec::with_capacity(demand.len());

        for &(variant_id, requested) in demand {
            let on_hand = sellable_on_hand(&mut conn, variant_id).await?;
            let reserved = reserved_quantity(&mut conn, variant_id, exclude_reservation).await?;
            let available = effective_available(on_hand, 0, reserved);

            results.push(AvailabilityResult {
                variant_id,
                requested,
                available,
                sufficient: is_sufficient(available, requested),
            });
        }

        Ok(results)
    }

    /// Single-variant convenience wrapper around [`check`](Self::check).
    pub async fn check_one(
        &self,
        variant_id: Uuid,
        requested: i64,
        exclude_reservation: Option<Uuid>,
    ) -> AppResult<AvailabilityResult> {
        let mut results = self
            .check(&[(variant_id, requested)], exclude_reservation)
            .await?;
        Ok(results.remove(0))
    }
}
