//! Stock ledger models: per-warehouse stock items, the append-only movement
//! log, and transient reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// On-hand stock for a (variant, warehouse) pair.
///
/// `quantity` is a materialized cache over the movement log; summing the
/// signed movement quantities for the pair must always reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub variant_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i64,
    /// Buffer excluded from sellable availability
    pub safety_stock: i64,
    pub updated_at: DateTime<Utc>,
}

/// Types of stock movements
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementType::In),
            "out" => Some(MovementType::Out),
            "adjustment" => Some(MovementType::Adjustment),
            _ => None,
        }
    }
}

/// Append-only stock movement log entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    /// Signed quantity; the ledger invariant sums these
    pub quantity: i64,
    pub reason_code: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// What a reservation was created for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationSource {
    Cart,
    Order,
}

impl ReservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationSource::Cart => "cart",
            ReservationSource::Order => "order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cart" => Some(ReservationSource::Cart),
            "order" => Some(ReservationSource::Order),
            _ => None,
        }
    }
}

/// Lifecycle of a reservation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Expired,
    Consumed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Consumed => "consumed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReservationStatus::Active),
            "expired" => Some(ReservationStatus::Expired),
            "consumed" => Some(ReservationStatus::Consumed),
            _ => None,
        }
    }
}

/// A temporary hold against on-hand stock, associated with a cart or order.
///
/// `warehouse_id` of `None` means the reservation is warehouse-agnostic and
/// is validated against the variant's aggregate availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub quantity: i64,
    pub source: ReservationSource,
    pub source_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl StockReservation {
    /// Whether the reservation still holds stock at `now`.
    ///
    /// A reservation past `expires_at` no longer holds stock even if the
    /// expiry sweep has not flipped its status yet.
    pub fn holds_stock_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active
            && self.expires_at.map_or(true, |at| at > now)
    }
}

/// Per-variant result of an availability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub variant_id: Uuid,
    pub requested: i64,
    pub available: i64,
    pub sufficient: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(status: ReservationStatus, expires_at: Option<DateTime<Utc>>) -> StockReservation {
        StockReservation {
            id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            warehouse_id: None,
            quantity: 1,
            source: ReservationSource::Cart,
            source_id: Uuid::new_v4(),
            expires_at,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_unexpired_holds_stock() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Active, Some(now + Duration::minutes(5)));
        assert!(r.holds_stock_at(now));
    }

    #[test]
    fn test_logically_expired_does_not_hold_stock() {
        // Past expires_at counts as released even before the sweep runs
        let now = Utc::now();
        let r = reservation(ReservationStatus::Active, Some(now - Duration::seconds(1)));
        assert!(!r.holds_stock_at(now));
    }

    #[test]
    fn test_no_expiry_holds_until_released() {
        let now = Utc::now();
        let r = reservation(ReservationStatus::Active, None);
        assert!(r.holds_stock_at(now));
    }

    #[test]
    fn test_consumed_and_expired_do_not_hold() {
        let now = Utc::now();
        assert!(!reservation(ReservationStatus::Consumed, None).holds_stock_at(now));
        assert!(!reservation(ReservationStatus::Expired, None).holds_stock_at(now));
    }

    #[test]
    fn test_enum_round_trips() {
        for t in [MovementType::In, MovementType::Out, MovementType::Adjustment] {
            assert_eq!(MovementType::parse(t.as_str()), Some(t));
        }
        for s in [
            ReservationStatus::Active,
            ReservationStatus::Expired,
            ReservationStatus::Consumed,
        ] {
            assert_eq!(ReservationStatus::parse(s.as_str()), Some(s));
        }
    }
}
