//! Cart models: the active cart aggregate, its line items, and the coupon
//! snapshot stored on apply.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::OwnerRef;

/// Cart lifecycle; `Converted` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Converted => "converted",
            CartStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CartStatus::Active),
            "converted" => Some(CartStatus::Converted),
            "abandoned" => Some(CartStatus::Abandoned),
            _ => None,
        }
    }
}

/// A shopping cart owned by a user or guest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub currency: String,
    pub status: CartStatus,
    /// Ordered by insertion
    pub items: Vec<CartItem>,
    pub coupon: Option<CouponSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Recompute totals from the current lines and coupon snapshot.
    pub fn totals(&self) -> CartTotals {
        crate::validation::cart_totals(
            &self.items,
            self.coupon.as_ref().map(|c| c.discount_amount),
        )
    }
}

/// A cart line item with its price snapshot taken at add time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Unit price frozen when the line was first added
    pub unit_price: Decimal,
    pub currency: String,
    pub discount_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity) - self.discount_amount
    }
}

/// Coupon snapshot stored on the cart when a code is applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount_amount: Decimal,
    pub currency: String,
}

/// Recomputed-on-read cart totals. Tax and shipping are supplied externally
/// at checkout, never by the cart itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(quantity: i32, unit_price: Decimal) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            quantity,
            unit_price,
            currency: "USD".to_string(),
            discount_amount: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_total() {
        let line = item(3, dec("2.50"));
        assert_eq!(line.line_total(), dec("7.50"));
    }

    #[test]
    fn test_cart_totals_with_coupon() {
        let cart = Cart {
            id: Uuid::new_v4(),
            owner: OwnerRef::Guest {
                guest_token: "g".to_string(),
            },
            currency: "USD".to_string(),
            status: CartStatus::Active,
            items: vec![item(2, dec("50.00"))],
            coupon: Some(CouponSnapshot {
                code: "SAVE10".to_string(),
                discount_amount: dec("10.00"),
                currency: "USD".to_string(),
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let totals = cart.totals();
        assert_eq!(totals.subtotal, dec("100.00"));
        assert_eq!(totals.discount, dec("10.00"));
        assert_eq!(totals.total, dec("90.00"));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [CartStatus::Active, CartStatus::Converted, CartStatus::Abandoned] {
            assert_eq!(CartStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(CartStatus::parse("checked_out"), None);
    }
}
