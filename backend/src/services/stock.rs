//! Stock ledger service: movement log, materialized on-hand quantities, and
//! transient reservations.
//!
//! Every write runs in a single transaction and takes `FOR UPDATE` row locks
//! on the affected `stock_items` rows, so the availability read and the
//! reservation/movement write cannot interleave with a concurrent writer.
//! The movement log is the source of truth; `stock_items.quantity` is a
//! materialized cache recomputable from it.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{
    MovementType, ReservationSource, ReservationStatus, StockItem, StockMovement,
    StockReservation,
};
use shared::types::EntityRef;
use shared::validation::validate_positive_quantity;

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedgerService {
    db: PgPool,
}

/// Input for creating a reservation
#[derive(Debug, Clone)]
pub struct ReserveInput {
    pub variant_id: Uuid,
    /// None reserves against the variant's aggregate availability
    pub warehouse_id: Option<Uuid>,
    pub quantity: i64,
    pub source: ReservationSource,
    pub source_id: Uuid,
    /// None creates a reservation that only an explicit release can undo
    pub ttl: Option<Duration>,
}

#[derive(Debug, FromRow)]
struct StockItemRow {
    variant_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    safety_stock: i64,
    updated_at: DateTime<Utc>,
}

impl From<StockItemRow> for StockItem {
    fn from(r: StockItemRow) -> Self {
        StockItem {
            variant_id: r.variant_id,
            warehouse_id: r.warehouse_id,
            quantity: r.quantity,
            safety_stock: r.safety_stock,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    variant_id: Uuid,
    warehouse_id: Option<Uuid>,
    quantity: i64,
    source_type: String,
    source_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_model(self) -> AppResult<StockReservation> {
        let source = ReservationSource::parse(&self.source_type)
            .ok_or_else(|| AppError::Internal(format!("bad source_type: {}", self.source_type)))?;
        let status = ReservationStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("bad reservation status: {}", self.status)))?;
        Ok(StockReservation {
            id: self.id,
            variant_id: self.variant_id,
            warehouse_id: self.warehouse_id,
            quantity: self.quantity,
            source,
            source_id: self.source_id,
            expires_at: self.expires_at,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    variant_id: Uuid,
    warehouse_id: Uuid,
    movement_type: String,
    quantity: i64,
    reason_code: String,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_model(self) -> AppResult<StockMovement> {
        let movement_type = MovementType::parse(&self.movement_type).ok_or_else(|| {
            AppError::Internal(format!("bad movement_type: {}", self.movement_type))
        })?;
        Ok(StockMovement {
            id: self.id,
            variant_id: self.variant_id,
            warehouse_id: self.warehouse_id,
            movement_type,
            quantity: self.quantity,
            reason_code: self.reason_code,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            created_at: self.created_at,
        })
    }
}

/// Sum of stock held by active, non-logically-expired reservations for a
/// variant, optionally excluding one reservation (requantify flows).
///
/// Reservations past `expires_at` are filtered here even when the sweep has
/// not flipped them yet, so a lagging sweep never under-counts availability.
pub(crate) async fn reserved_quantity(
    conn: &mut PgConnection,
    variant_id: Uuid,
    exclude_reservation: Option<Uuid>,
) -> AppResult<i64> {
    let reserved: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM stock_reservations
        WHERE variant_id = $1
          AND status = 'active'
          AND (expires_at IS NULL OR expires_at > NOW())
          AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(variant_id)
    .bind(exclude_reservation)
    .fetch_one(&mut *conn)
    .await?;
    Ok(reserved)
}

/// Aggregate sellable quantity for a variant across warehouses before
/// reservations: sum of (on-hand - safety stock).
pub(crate) async fn sellable_on_hand(
    conn: &mut PgConnection,
    variant_id: Uuid,
) -> AppResult<i64> {
    let on_hand: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity - safety_stock), 0) FROM stock_items WHERE variant_id = $1",
    )
    .bind(variant_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(on_hand)
}

impl StockLedgerService {
    /// Create a new StockLedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append a movement and update the materialized on-hand quantity.
    ///
    /// The stock item row is created on first adjustment. Fails with
    /// `InvalidAdjustment` if the resulting quantity would go negative.
    pub async fn adjust(
        &self,
        variant_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        reason_code: &str,
        reference: Option<EntityRef>,
    ) -> AppResult<StockItem> {
        if delta == 0 {
            return Err(AppError::Validation {
                field: "delta".to_string(),
                message: "Adjustment delta must be non-zero".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        // Ensure the row exists, then lock it
        sqlx::query(
            r#"
            INSERT INTO stock_items (variant_id, warehouse_id, quantity, safety_stock)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (variant_id, warehouse_id) DO NOTHING
            "#,
        )
        .bind(variant_id)
        .bind(warehouse_id)
        .execute(&mut *tx)
        .await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT quantity FROM stock_items WHERE variant_id = $1 AND warehouse_id = $2 FOR UPDATE",
        )
        .bind(variant_id)
        .bind(warehouse_id)
        .fetch_one(&mut *tx)
        .await?;

        let new_quantity = current + delta;
        if new_quantity < 0 {
            return Err(AppError::InvalidAdjustment(format!(
                "Adjustment of {} would take on-hand quantity from {} below zero",
                delta, current
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (variant_id, warehouse_id, movement_type, quantity, reason_code,
                 reference_type, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(variant_id)
        .bind(warehouse_id)
        .bind(MovementType::Adjustment.as_str())
        .bind(delta)
        .bind(reason_code)
        .bind(reference.as_ref().map(|r| r.ref_type.clone()))
        .bind(reference.as_ref().map(|r| r.ref_id))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, StockItemRow>(
            r#"
            UPDATE stock_items
            SET quantity = $1, updated_at = NOW()
            WHERE variant_id = $2 AND warehouse_id = $3
            RETURNING variant_id, warehouse_id, quantity, safety_stock, updated_at
            "#,
        )
        .bind(new_quantity)
        .bind(variant_id)
        .bind(warehouse_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%variant_id, %warehouse_id, delta, reason_code, "stock adjusted");
        Ok(row.into())
    }

    /// Set the safety stock buffer for a (variant, warehouse) pair.
    pub async fn set_safety_stock(
        &self,
        variant_id: Uuid,
        warehouse_id: Uuid,
        safety_stock: i64,
    ) -> AppResult<StockItem> {
        if safety_stock < 0 {
            return Err(AppError::Validation {
                field: "safety_stock".to_string(),
                message: "Safety stock cannot be negative".to_string(),
            });
        }

        let row = sqlx::query_as::<_, StockItemRow>(
            r#"
            INSERT INTO stock_items (variant_id, warehouse_id, quantity, safety_stock)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (variant_id, warehouse_id)
                DO UPDATE SET safety_stock = $3, updated_at = NOW()
            RETURNING variant_id, warehouse_id, quantity, safety_stock, updated_at
            "#,
        )
        .bind(variant_id)
        .bind(warehouse_id)
        .bind(safety_stock)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    /// Create an active reservation after confirming availability.
    ///
    /// The availability check and the insert happen in one transaction with
    /// all of the variant's stock item rows locked, so two concurrent
    /// reserves against the same last unit serialize and exactly one wins.
    /// Availability is always validated at the aggregate level, matching the
    /// availability checker's arithmetic exactly; `warehouse_id` targets
    /// where the eventual consumption is taken from.
    pub async fn reserve(&self, input: ReserveInput) -> AppResult<StockReservation> {
        validate_positive_quantity(input.quantity).map_err(|msg| AppError::Validation {
            field: "quantity".to_string(),
            message: msg.to_string(),
        })?;

        let mut tx = self.db.begin().await?;

        // Lock every row for the variant; aggregate availability spans them
        sqlx::query("SELECT 1 FROM stock_items WHERE variant_id = $1 FOR UPDATE")
            .bind(input.variant_id)
            .execute(&mut *tx)
            .await?;

        let on_hand = sellable_on_hand(&mut tx, input.variant_id).await?;
        let reserved = reserved_quantity(&mut tx, input.variant_id, None).await?;
        let available = shared::validation::effective_available(on_hand, 0, reserved);

        if !shared::validation::is_sufficient(available, input.quantity) {
            return Err(AppError::InsufficientStock {
                variant_id: input.variant_id,
                requested: input.quantity,
                available,
            });
        }

        let expires_at = input.ttl.map(|ttl| Utc::now() + ttl);

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            INSERT INTO stock_reservations
                (variant_id, warehouse_id, quantity, source_type, source_id, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            RETURNING id, variant_id, warehouse_id, quantity, source_type, source_id,
                      expires_at, status, created_at
            "#,
        )
        .bind(input.variant_id)
        .bind(input.warehouse_id)
        .bind(input.quantity)
        .bind(input.source.as_str())
        .bind(input.source_id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            variant_id = %input.variant_id,
            quantity = input.quantity,
            source = input.source.as_str(),
            source_id = %input.source_id,
            "stock reserved"
        );
        row.into_model()
    }

    /// Release a reservation, returning its capacity to the pool.
    ///
    /// Idempotent: releasing an already-released (or unknown) reservation is
    /// a no-op, not an error.
    pub async fn release(&self, reservation_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE stock_reservations SET status = 'expired' WHERE id = $1 AND status = 'active'",
        )
        .bind(reservation_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(%reservation_id, "reservation released");
        }
        Ok(())
    }

    /// Consume a reservation: mark it consumed and write the permanent `out`
    /// movement(s) decrementing on-hand stock.
    ///
    /// Warehouse-agnostic reservations are allocated greedily from the
    /// fullest warehouse down.
    pub async fn consume(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, variant_id, warehouse_id, quantity, source_type, source_id,
                   expires_at, status, created_at
            FROM stock_reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation".to_string()))?;

        let reservation = row.into_model()?;
        if reservation.status != ReservationStatus::Active {
            return Err(AppError::BusinessRule(format!(
                "Reservation {} is not active",
                reservation_id
            )));
        }

        // Lock the stock rows the consumption will draw from
        let items = sqlx::query_as::<_, StockItemRow>(
            r#"
            SELECT variant_id, warehouse_id, quantity, safety_stock, updated_at
            FROM stock_items
            WHERE variant_id = $1
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY quantity DESC
            FOR UPDATE
            "#,
        )
        .bind(reservation.variant_id)
        .bind(reservation.warehouse_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut remaining = reservation.quantity;
        for item in &items {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(item.quantity.max(0));
            if take == 0 {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO stock_movements
                    (variant_id, warehouse_id, movement_type, quantity, reason_code,
                     reference_type, reference_id)
                VALUES ($1, $2, 'out', $3, 'reservation_consumed', $4, $5)
                "#,
            )
            .bind(item.variant_id)
            .bind(item.warehouse_id)
            .bind(-take)
            .bind(reservation.source.as_str())
            .bind(reservation.source_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE stock_items
                SET quantity = quantity - $1, updated_at = NOW()
                WHERE variant_id = $2 AND warehouse_id = $3
                "#,
            )
            .bind(take)
            .bind(item.variant_id)
            .bind(item.warehouse_id)
            .execute(&mut *tx)
            .await?;

            remaining -= take;
        }

        if remaining > 0 {
            // Never expected: reservations are validated against on-hand
            return Err(AppError::InvalidAdjustment(format!(
                "On-hand stock cannot cover reservation {} ({} units short)",
                reservation_id, remaining
            )));
        }

        sqlx::query("UPDATE stock_reservations SET status = 'consumed' WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%reservation_id, quantity = reservation.quantity, "reservation consumed");
        Ok(())
    }

    /// Return a source's permanently consumed stock to the pool by writing
    /// `in` movements reversing its net `out` movements.
    ///
    /// Idempotent: the net is computed over all movements referencing the
    /// source, so a second call finds nothing left to return. Returns the
    /// total quantity restocked.
    pub async fn restock(
        &self,
        source: ReservationSource,
        source_id: Uuid,
    ) -> AppResult<i64> {
        let mut tx = self.db.begin().await?;

        let owed = sqlx::query_as::<_, (Uuid, Uuid, i64)>(
            r#"
            SELECT variant_id, warehouse_id, SUM(quantity)
            FROM stock_movements
            WHERE reference_type = $1 AND reference_id = $2
            GROUP BY variant_id, warehouse_id
            HAVING SUM(quantity) < 0
            "#,
        )
        .bind(source.as_str())
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut restocked = 0i64;
        for (variant_id, warehouse_id, net) in owed {
            let give_back = -net;

            sqlx::query(
                "SELECT 1 FROM stock_items WHERE variant_id = $1 AND warehouse_id = $2 FOR UPDATE",
            )
            .bind(variant_id)
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO stock_movements
                    (variant_id, warehouse_id, movement_type, quantity, reason_code,
                     reference_type, reference_id)
                VALUES ($1, $2, 'in', $3, 'restock', $4, $5)
                "#,
            )
            .bind(variant_id)
            .bind(warehouse_id)
            .bind(give_back)
            .bind(source.as_str())
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE stock_items
                SET quantity = quantity + $1, updated_at = NOW()
                WHERE variant_id = $2 AND warehouse_id = $3
                "#,
            )
            .bind(give_back)
            .bind(variant_id)
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;

            restocked += give_back;
        }

        tx.commit().await?;

        if restocked > 0 {
            tracing::info!(
                source = source.as_str(),
                %source_id,
                restocked,
                "consumed stock returned to pool"
            );
        }
        Ok(restocked)
    }

    /// Expiry sweep: transition active reservations past `expires_at` to
    /// expired, returning capacity to the pool. Returns the count swept.
    pub async fn expire_due(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET status = 'expired'
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= NOW()
            "#,
        )
        .execute(&self.db)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            tracing::info!(swept, "expired due reservations");
        }
        Ok(swept)
    }

    /// Active reservations attached to a source (cart or order).
    pub async fn reservations_for_source(
        &self,
        source: ReservationSource,
        source_id: Uuid,
    ) -> AppResult<Vec<StockReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, variant_id, warehouse_id, quantity, source_type, source_id,
                   expires_at, status, created_at
            FROM stock_reservations
            WHERE source_type = $1 AND source_id = $2 AND status = 'active'
            ORDER BY created_at
            "#,
        )
        .bind(source.as_str())
        .bind(source_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ReservationRow::into_model).collect()
    }

    /// Movement log for a (variant, warehouse) pair, newest first.
    pub async fn movements(
        &self,
        variant_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, variant_id, warehouse_id, movement_type, quantity, reason_code,
                   reference_type, reference_id, created_at
            FROM stock_movements
            WHERE variant_id = $1
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(variant_id)
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRow::into_model).collect()
    }

    /// Stock items for a variant across warehouses.
    pub async fn items(&self, variant_id: Uuid) -> AppResult<Vec<StockItem>> {
        let rows = sqlx::query_as::<_, StockItemRow>(
            r#"
            SELECT variant_id, warehouse_id, quantity, safety_stock, updated_at
            FROM stock_items
            WHERE variant_id = $1
            ORDER BY warehouse_id
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(StockItem::from).collect())
    }

    /// Ledger consistency check: movement sums vs materialized quantities.
    /// Returns pairs where the two disagree (always empty when healthy).
    pub async fn ledger_drift(&self, variant_id: Uuid) -> AppResult<Vec<(Uuid, i64, i64)>> {
        let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
            r#"
            SELECT si.warehouse_id,
                   si.quantity,
                   COALESCE(SUM(sm.quantity), 0) AS movement_sum
            FROM stock_items si
            LEFT JOIN stock_movements sm
                   ON sm.variant_id = si.variant_id AND sm.warehouse_id = si.warehouse_id
            WHERE si.variant_id = $1
            GROUP BY si.warehouse_id, si.quantity
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, cached, summed)| cached != summed)
            .collect())
    }
}
