//! Coupon validation and discount calculation tests

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{calculate_discount, clamp_discount, Coupon, CouponValidation, DiscountRule};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn coupon(rule: DiscountRule, value: &str) -> Coupon {
    Coupon {
        id: Uuid::new_v4(),
        code: "TEST".to_string(),
        rule,
        value: dec(value),
        currency: "USD".to_string(),
        active: true,
        starts_at: None,
        ends_at: None,
        usage_limit: None,
        per_user_limit: None,
        min_cart_amount: None,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

mod discount_calculation {
    use super::*;

    #[test]
    fn percentage_of_subtotal() {
        let d = calculate_discount(DiscountRule::Percentage, dec("10"), dec("250.00"));
        assert_eq!(d, dec("25.00"));
    }

    #[test]
    fn hundred_percent_zeroes_the_cart() {
        let d = calculate_discount(DiscountRule::Percentage, dec("100"), dec("80.00"));
        assert_eq!(d, dec("80.00"));
    }

    #[test]
    fn fixed_amount_below_subtotal() {
        let d = calculate_discount(DiscountRule::Fixed, dec("15.00"), dec("100.00"));
        assert_eq!(d, dec("15.00"));
    }

    #[test]
    fn fixed_amount_capped_at_subtotal() {
        // A 25-off coupon on a 20 cart discounts 20, not 25
        let d = calculate_discount(DiscountRule::Fixed, dec("25.00"), dec("20.00"));
        assert_eq!(d, dec("20.00"));
    }

    #[test]
    fn zero_subtotal_yields_zero_discount() {
        assert_eq!(
            calculate_discount(DiscountRule::Percentage, dec("50"), Decimal::ZERO),
            Decimal::ZERO
        );
        assert_eq!(
            calculate_discount(DiscountRule::Fixed, dec("10.00"), Decimal::ZERO),
            Decimal::ZERO
        );
    }
}

mod eligibility {
    use super::*;

    fn within_window(c: &Coupon) -> bool {
        let now = Utc::now();
        c.starts_at.map_or(true, |at| at <= now) && c.ends_at.map_or(true, |at| at > now)
    }

    #[test]
    fn open_window_is_always_eligible() {
        assert!(within_window(&coupon(DiscountRule::Fixed, "5.00")));
    }

    #[test]
    fn not_yet_started_is_ineligible() {
        let mut c = coupon(DiscountRule::Fixed, "5.00");
        c.starts_at = Some(Utc::now() + Duration::days(1));
        assert!(!within_window(&c));
    }

    #[test]
    fn past_end_is_ineligible() {
        let mut c = coupon(DiscountRule::Fixed, "5.00");
        c.ends_at = Some(Utc::now() - Duration::days(1));
        assert!(!within_window(&c));
    }

    #[test]
    fn min_cart_amount_boundary() {
        let mut c = coupon(DiscountRule::Percentage, "10");
        c.min_cart_amount = Some(dec("50.00"));

        // Exactly at the threshold qualifies
        assert!(dec("50.00") >= c.min_cart_amount.unwrap());
        assert!(dec("49.99") < c.min_cart_amount.unwrap());
    }
}

mod validation_result {
    use super::*;

    #[test]
    fn rejection_is_uniform() {
        // Every rejection reason maps to the same user-facing result
        let v = CouponValidation::not_applicable();
        assert!(!v.valid);
        assert_eq!(v.message, "Coupon is not applicable");
        assert!(v.discount_amount.is_none());
    }

    #[test]
    fn acceptance_carries_the_discount() {
        let v = CouponValidation::applicable(dec("12.50"));
        assert!(v.valid);
        assert_eq!(v.discount_amount, Some(dec("12.50")));
    }

    #[test]
    fn rejection_serializes_without_discount_field() {
        let json = serde_json::to_value(CouponValidation::not_applicable()).unwrap();
        assert!(json.get("discount_amount").is_none());
        assert_eq!(json["valid"], serde_json::Value::Bool(false));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..1_000_000).prop_map(|cents| Decimal::new(cents as i64, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A discount never exceeds the subtotal it applies to, for either rule.
    #[test]
    fn prop_discount_never_exceeds_subtotal(
        value in 0u32..100,
        subtotal in money_strategy(),
    ) {
        let pct = calculate_discount(
            DiscountRule::Percentage,
            Decimal::from(value),
            subtotal,
        );
        prop_assert!(pct <= subtotal);
        prop_assert!(pct >= Decimal::ZERO);

        let fixed = calculate_discount(
            DiscountRule::Fixed,
            Decimal::new(value as i64, 2),
            subtotal,
        );
        prop_assert!(fixed <= subtotal);
        prop_assert!(fixed >= Decimal::ZERO);
    }

    /// Percentage discounts scale linearly with the subtotal.
    #[test]
    fn prop_percentage_scales_linearly(
        value in 1u32..100,
        subtotal in money_strategy(),
    ) {
        let one = calculate_discount(DiscountRule::Percentage, Decimal::from(value), subtotal);
        let double = calculate_discount(
            DiscountRule::Percentage,
            Decimal::from(value),
            subtotal * Decimal::from(2),
        );
        prop_assert_eq!(double, one * Decimal::from(2));
    }

    /// Clamping is idempotent and keeps the discount within [0, subtotal].
    #[test]
    fn prop_clamp_idempotent(
        discount in money_strategy(),
        subtotal in money_strategy(),
    ) {
        let once = clamp_discount(discount, subtotal);
        prop_assert!(once >= Decimal::ZERO);
        prop_assert!(once <= subtotal);
        prop_assert_eq!(clamp_discount(once, subtotal), once);
    }
}
