//! Pure validation and pricing arithmetic for the commerce core
//!
//! Everything here is side-effect free. The backend services call these
//! helpers so that the availability checker and the reserving transaction
//! apply the exact same arithmetic, and so the rules stay testable without a
//! database.

use rust_decimal::Decimal;

use crate::models::{CartItem, CartTotals, DiscountRule};

/// Hard cap on the quantity of a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 99;

// ============================================================================
// Quantities
// ============================================================================

/// Cap a requested line quantity at the per-line maximum.
///
/// Oversized requests are capped, not rejected: asking for 150 of a line
/// capped at 99 stores 99.
pub fn cap_line_quantity(requested: i32, max: i32) -> i32 {
    requested.min(max)
}

/// Validate that a quantity is usable for a stock operation.
pub fn validate_positive_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

// ============================================================================
// Availability arithmetic
// ============================================================================

/// Sellable availability for a variant: on-hand minus safety stock minus
/// stock held by active, non-expired reservations.
///
/// The result may be negative when safety stock exceeds on-hand; callers
/// compare against a requested quantity rather than clamping.
pub fn effective_available(on_hand: i64, safety_stock: i64, reserved: i64) -> i64 {
    on_hand - safety_stock - reserved
}

/// Whether `requested` units can be taken from the given availability.
pub fn is_sufficient(available: i64, requested: i64) -> bool {
    available >= requested
}

// ============================================================================
// Discounts
// ============================================================================

/// Compute a discount amount for a subtotal.
///
/// Percentage rules take `value` as a 0-100 percentage; fixed rules cap the
/// discount at the subtotal so a total can never go negative.
pub fn calculate_discount(rule: DiscountRule, value: Decimal, subtotal: Decimal) -> Decimal {
    match rule {
        DiscountRule::Percentage => subtotal * value / Decimal::from(100),
        DiscountRule::Fixed => value.min(subtotal),
    }
}

/// Clamp a stored discount snapshot to the current subtotal.
pub fn clamp_discount(discount: Decimal, subtotal: Decimal) -> Decimal {
    discount.min(subtotal).max(Decimal::ZERO)
}

// ============================================================================
// Cart totals
// ============================================================================

/// Recompute cart totals from its lines and the applied coupon's discount
/// snapshot. Tax and shipping are supplied externally at checkout time.
pub fn cart_totals(items: &[CartItem], coupon_discount: Option<Decimal>) -> CartTotals {
    let subtotal: Decimal = items
        .iter()
        .map(|item| item.unit_price * Decimal::from(item.quantity))
        .sum();
    let discount = clamp_discount(coupon_discount.unwrap_or(Decimal::ZERO), subtotal);

    CartTotals {
        subtotal,
        discount,
        total: subtotal - discount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(quantity: i32, unit_price: &str) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            quantity,
            unit_price: dec(unit_price),
            currency: "USD".to_string(),
            discount_amount: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cap_line_quantity() {
        assert_eq!(cap_line_quantity(150, MAX_LINE_QUANTITY), 99);
        assert_eq!(cap_line_quantity(99, MAX_LINE_QUANTITY), 99);
        assert_eq!(cap_line_quantity(1, MAX_LINE_QUANTITY), 1);
    }

    #[test]
    fn test_effective_available() {
        assert_eq!(effective_available(100, 10, 25), 65);
        // Safety stock can push availability below zero
        assert_eq!(effective_available(5, 10, 0), -5);
    }

    #[test]
    fn test_is_sufficient() {
        assert!(is_sufficient(5, 5));
        assert!(!is_sufficient(4, 5));
        assert!(!is_sufficient(-1, 0));
    }

    #[test]
    fn test_percentage_discount() {
        let d = calculate_discount(DiscountRule::Percentage, dec("10"), dec("100.00"));
        assert_eq!(d, dec("10.00"));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let d = calculate_discount(DiscountRule::Fixed, dec("25.00"), dec("20.00"));
        assert_eq!(d, dec("20.00"));
    }

    #[test]
    fn test_cart_totals_exclude_removed_line() {
        let items = vec![item(2, "50.00")];
        let totals = cart_totals(&items, None);
        assert_eq!(totals.subtotal, dec("100.00"));
        assert_eq!(totals.total, dec("100.00"));

        let empty: Vec<CartItem> = vec![];
        let totals = cart_totals(&empty, None);
        assert_eq!(totals.subtotal, Decimal::ZERO);
    }

    #[test]
    fn test_stale_coupon_snapshot_clamped() {
        // Coupon snapshot larger than the shrunken subtotal never produces a
        // negative total
        let items = vec![item(1, "5.00")];
        let totals = cart_totals(&items, Some(dec("10.00")));
        assert_eq!(totals.discount, dec("5.00"));
        assert_eq!(totals.total, Decimal::ZERO);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn discount_stays_within_subtotal(
                value in 0u32..200,
                subtotal_cents in 0u32..1_000_000,
            ) {
                let subtotal = Decimal::new(subtotal_cents as i64, 2);
                let fixed = calculate_discount(
                    DiscountRule::Fixed,
                    Decimal::new(value as i64, 2),
                    subtotal,
                );
                prop_assert!(fixed >= Decimal::ZERO);
                prop_assert!(fixed <= subtotal);
            }

            #[test]
            fn totals_never_negative(
                quantities in prop::collection::vec(1i32..99, 0..6),
                discount_cents in 0u32..1_000_000,
            ) {
                let items: Vec<CartItem> =
                    quantities.iter().map(|&q| item(q, "9.99")).collect();
                let totals = cart_totals(
                    &items,
                    Some(Decimal::new(discount_cents as i64, 2)),
                );
                prop_assert!(totals.total >= Decimal::ZERO);
                prop_assert_eq!(totals.total, totals.subtotal - totals.discount);
            }
        }
    }
}
