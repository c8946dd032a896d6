//! Order placement and state machine tests
//!
//! Covers the status state machine, frozen order totals, order number
//! format, and the status history chain.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{AddressSnapshot, OrderStatus};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

const ALL_STATUSES: [OrderStatus; 4] = [
    OrderStatus::PendingPayment,
    OrderStatus::Paid,
    OrderStatus::Fulfilled,
    OrderStatus::Cancelled,
];

// ============================================================================
// Unit Tests
// ============================================================================

mod state_machine {
    use super::*;

    #[test]
    fn pending_payment_can_be_paid_or_cancelled() {
        assert!(OrderStatus::PendingPayment.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::PendingPayment.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::PendingPayment.can_transition_to(OrderStatus::Fulfilled));
    }

    #[test]
    fn paid_can_be_fulfilled_or_cancelled() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Fulfilled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PendingPayment));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for next in ALL_STATUSES {
            assert!(!OrderStatus::Fulfilled.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
        assert!(OrderStatus::Fulfilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in ALL_STATUSES {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn transition_reports_both_endpoints() {
        let err = OrderStatus::Fulfilled
            .transition_to(OrderStatus::Paid)
            .unwrap_err();
        assert_eq!(err.from, OrderStatus::Fulfilled);
        assert_eq!(err.to, OrderStatus::Paid);
        assert_eq!(
            err.to_string(),
            "cannot transition order from fulfilled to paid"
        );
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL_STATUSES {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}

mod totals {
    use super::*;

    #[test]
    fn total_formula() {
        // total = subtotal - discount + tax + shipping
        let subtotal = dec("100.00");
        let discount = dec("10.00");
        let tax = dec("7.00");
        let shipping = dec("5.00");
        assert_eq!(subtotal - discount + tax + shipping, dec("102.00"));
    }

    #[test]
    fn stale_coupon_contributes_nothing() {
        // Coupon failed re-validation at placement: discount is zeroed, not
        // the placement rejected
        let subtotal = dec("100.00");
        let discount = Decimal::ZERO;
        assert_eq!(subtotal - discount, dec("100.00"));
    }

    #[test]
    fn line_total_includes_line_discount() {
        let unit_price = dec("25.00");
        let quantity = Decimal::from(3);
        let line_discount = dec("5.00");
        assert_eq!(unit_price * quantity - line_discount, dec("70.00"));
    }
}

mod order_numbers {
    fn format_order_number(year: i32, sequence: i64) -> String {
        format!("ORD-{}-{:06}", year, sequence)
    }

    #[test]
    fn format_is_stable() {
        assert_eq!(format_order_number(2026, 42), "ORD-2026-000042");
        assert_eq!(format_order_number(2026, 123_456), "ORD-2026-123456");
    }

    #[test]
    fn sequence_does_not_truncate_past_six_digits() {
        assert_eq!(format_order_number(2026, 1_000_000), "ORD-2026-1000000");
    }
}

mod snapshots {
    use super::*;

    #[test]
    fn address_round_trips_through_json() {
        let address = AddressSnapshot {
            name: "Jamie Doe".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
        };
        let value = serde_json::to_value(&address).unwrap();
        let back: AddressSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, address);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(ALL_STATUSES.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// transition_to succeeds exactly when can_transition_to allows it, and
    /// a successful transition lands on the requested state.
    #[test]
    fn prop_transition_agrees_with_guard(
        from in status_strategy(),
        to in status_strategy(),
    ) {
        match from.transition_to(to) {
            Ok(next) => {
                prop_assert!(from.can_transition_to(to));
                prop_assert_eq!(next, to);
            }
            Err(err) => {
                prop_assert!(!from.can_transition_to(to));
                prop_assert_eq!(err.from, from);
                prop_assert_eq!(err.to, to);
            }
        }
    }

    /// No sequence of transitions escapes a terminal state.
    #[test]
    fn prop_terminal_states_are_absorbing(
        attempts in prop::collection::vec(status_strategy(), 1..10),
    ) {
        for terminal in [OrderStatus::Fulfilled, OrderStatus::Cancelled] {
            let mut state = terminal;
            for next in &attempts {
                if let Ok(new_state) = state.transition_to(*next) {
                    state = new_state;
                }
            }
            prop_assert_eq!(state, terminal);
        }
    }

    /// The order total formula is monotone in tax and shipping and never
    /// drops below subtotal - discount.
    #[test]
    fn prop_total_monotone(
        subtotal_cents in 0u32..1_000_000,
        discount_cents in 0u32..1_000_000,
        tax_cents in 0u32..100_000,
        shipping_cents in 0u32..100_000,
    ) {
        let subtotal = Decimal::new(subtotal_cents as i64, 2);
        let discount = Decimal::new(discount_cents.min(subtotal_cents) as i64, 2);
        let tax = Decimal::new(tax_cents as i64, 2);
        let shipping = Decimal::new(shipping_cents as i64, 2);

        let total = subtotal - discount + tax + shipping;
        prop_assert!(total >= subtotal - discount);
        prop_assert!(total >= Decimal::ZERO);
    }
}
