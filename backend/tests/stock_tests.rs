//! Stock ledger tests
//!
//! Covers the availability arithmetic, reservation accounting, and the
//! ledger invariant that the materialized on-hand quantity equals the sum
//! of signed movement quantities.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use shared::{
    effective_available, is_sufficient, MovementType, ReservationSource, ReservationStatus,
    StockReservation,
};
use uuid::Uuid;

/// Sum of quantities held by reservations that still hold stock at `now`
fn holds_stock_sum(rows: &[StockReservation], now: DateTime<Utc>) -> i64 {
    rows.iter()
        .filter(|r| r.holds_stock_at(now))
        .map(|r| r.quantity)
        .sum()
}

fn reservation(
    quantity: i64,
    status: ReservationStatus,
    expires_at: Option<DateTime<Utc>>,
) -> StockReservation {
    StockReservation {
        id: Uuid::new_v4(),
        variant_id: Uuid::new_v4(),
        warehouse_id: None,
        quantity,
        source: ReservationSource::Cart,
        source_id: Uuid::new_v4(),
        expires_at,
        status,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

mod availability {
    use super::*;

    #[test]
    fn safety_stock_is_excluded() {
        // 100 on hand, 10 held back, nothing reserved
        assert_eq!(effective_available(100, 10, 0), 90);
    }

    #[test]
    fn active_reservations_reduce_availability() {
        assert_eq!(effective_available(100, 10, 25), 65);
    }

    #[test]
    fn availability_can_go_negative() {
        // Safety stock raised above on-hand after the fact
        assert_eq!(effective_available(5, 10, 0), -5);
        assert!(!is_sufficient(effective_available(5, 10, 0), 1));
    }

    #[test]
    fn exact_fit_is_sufficient() {
        assert!(is_sufficient(5, 5));
        assert!(!is_sufficient(5, 6));
    }

    #[test]
    fn zero_request_against_zero_availability() {
        assert!(is_sufficient(0, 0));
    }
}

mod reservations {
    use super::*;

    #[test]
    fn active_unexpired_holds_stock() {
        let now = Utc::now();
        let r = reservation(3, ReservationStatus::Active, Some(now + Duration::minutes(30)));
        assert!(r.holds_stock_at(now));
    }

    #[test]
    fn active_without_deadline_holds_stock() {
        let r = reservation(3, ReservationStatus::Active, None);
        assert!(r.holds_stock_at(Utc::now()));
    }

    #[test]
    fn logically_expired_does_not_hold_stock() {
        // Past its deadline but the sweep has not flipped it yet
        let now = Utc::now();
        let r = reservation(3, ReservationStatus::Active, Some(now - Duration::minutes(1)));
        assert!(!r.holds_stock_at(now));
    }

    #[test]
    fn released_and_consumed_do_not_hold_stock() {
        let now = Utc::now();
        let deadline = Some(now + Duration::minutes(30));
        assert!(!reservation(3, ReservationStatus::Expired, deadline).holds_stock_at(now));
        assert!(!reservation(3, ReservationStatus::Consumed, deadline).holds_stock_at(now));
    }

    #[test]
    fn held_sum_counts_only_holding_reservations() {
        let now = Utc::now();
        let rows = vec![
            reservation(3, ReservationStatus::Active, Some(now + Duration::minutes(5))),
            reservation(4, ReservationStatus::Active, Some(now - Duration::minutes(5))),
            reservation(2, ReservationStatus::Consumed, None),
            reservation(1, ReservationStatus::Active, None),
        ];
        assert_eq!(holds_stock_sum(&rows, now), 4);
    }
}

mod movements {
    use super::*;

    #[test]
    fn movement_types_round_trip() {
        for t in [MovementType::In, MovementType::Out, MovementType::Adjustment] {
            assert_eq!(MovementType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::parse("transfer"), None);
    }

    #[test]
    fn ledger_invariant_over_movement_log() {
        // quantity cache must equal the signed sum of movements
        let movements: Vec<i64> = vec![50, -20, 10, -5];
        let cached: i64 = movements.iter().sum();
        assert_eq!(cached, 35);
    }
}

mod order_lifecycle {
    use super::*;

    /// Net quantity a source still owes the pool, and the reversing
    /// in-movement that settles it. Mirrors the restock query: only a
    /// negative net owes anything.
    fn owed_restock(movements: &[i64]) -> i64 {
        let net: i64 = movements.iter().sum();
        if net < 0 {
            -net
        } else {
            0
        }
    }

    #[test]
    fn order_holds_never_expire_on_their_own() {
        // Placement-time holds carry no deadline, so the sweep can never
        // drop them between reserve and consume
        let r = reservation(3, ReservationStatus::Active, None);
        assert!(r.holds_stock_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn placement_writes_the_out_movements() {
        // adjust +10, then an order for 3 consumes at placement
        let mut on_hand = 10i64;
        let order_movements = vec![-3i64];
        on_hand += order_movements.iter().sum::<i64>();
        assert_eq!(on_hand, 7);
        // paid adds no further movements for the order
        assert_eq!(owed_restock(&[-3, 0]), 3);
    }

    #[test]
    fn cancellation_restocks_exactly_what_placement_took() {
        let mut movements = vec![-3i64, -2];
        let give_back = owed_restock(&movements);
        assert_eq!(give_back, 5);
        movements.push(give_back);
        assert_eq!(movements.iter().sum::<i64>(), 0);
    }

    #[test]
    fn restock_is_idempotent() {
        // After one restock the net is zero, so a second pass finds nothing
        let movements = vec![-3i64, 3];
        assert_eq!(owed_restock(&movements), 0);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Reserving never over-allocates: a reservation is only granted when
    /// availability covers it, and granting it reduces availability by
    /// exactly its quantity.
    #[test]
    fn prop_reserve_conserves_availability(
        on_hand in 0i64..10_000,
        safety in 0i64..1_000,
        reserved in 0i64..10_000,
        request in 1i64..500,
    ) {
        let before = effective_available(on_hand, safety, reserved);
        if is_sufficient(before, request) {
            let after = effective_available(on_hand, safety, reserved + request);
            prop_assert_eq!(after, before - request);
            prop_assert!(after >= 0);
        }
    }

    /// Releasing a reservation returns exactly its quantity to the pool.
    #[test]
    fn prop_release_restores_availability(
        on_hand in 0i64..10_000,
        safety in 0i64..1_000,
        reserved in 1i64..5_000,
        held in 1i64..5_000,
    ) {
        prop_assume!(held <= reserved);
        let before = effective_available(on_hand, safety, reserved);
        let after = effective_available(on_hand, safety, reserved - held);
        prop_assert_eq!(after, before + held);
    }

    /// Consuming a reservation leaves net availability unchanged: the
    /// on-hand decrement is exactly matched by the reservation going away.
    #[test]
    fn prop_consume_is_availability_neutral(
        on_hand in 0i64..10_000,
        safety in 0i64..1_000,
        reserved in 1i64..5_000,
        held in 1i64..5_000,
    ) {
        prop_assume!(held <= reserved && held <= on_hand);
        let before = effective_available(on_hand, safety, reserved);
        let after = effective_available(on_hand - held, safety, reserved - held);
        prop_assert_eq!(after, before);
    }

    /// Restocking after cancellation returns availability exactly to where
    /// it stood before the order placed, regardless of how many lines the
    /// order consumed.
    #[test]
    fn prop_cancel_restock_round_trips(
        on_hand in 0i64..10_000,
        safety in 0i64..1_000,
        outs in prop::collection::vec(1i64..100, 1..10),
    ) {
        let taken: i64 = outs.iter().sum();
        prop_assume!(taken <= on_hand);
        let before = effective_available(on_hand, safety, 0);
        let after_place = effective_available(on_hand - taken, safety, 0);
        prop_assert_eq!(after_place, before - taken);
        let after_cancel = effective_available(on_hand - taken + taken, safety, 0);
        prop_assert_eq!(after_cancel, before);
    }

    /// The held-stock sum never counts expired or consumed rows and never
    /// exceeds the total of all reservation quantities.
    #[test]
    fn prop_held_sum_bounded(
        quantities in prop::collection::vec(1i64..100, 0..20),
        expired_mask in prop::collection::vec(any::<bool>(), 0..20),
    ) {
        let now = Utc::now();
        let rows: Vec<StockReservation> = quantities
            .iter()
            .zip(expired_mask.iter().chain(std::iter::repeat(&false)))
            .map(|(&q, &expired)| {
                let deadline = if expired {
                    Some(now - Duration::minutes(1))
                } else {
                    Some(now + Duration::minutes(30))
                };
                reservation(q, ReservationStatus::Active, deadline)
            })
            .collect();

        let held = holds_stock_sum(&rows, now);
        let total: i64 = quantities.iter().sum();
        prop_assert!(held >= 0);
        prop_assert!(held <= total);
    }
}
