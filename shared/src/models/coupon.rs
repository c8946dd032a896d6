//! Coupon and promotion models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a coupon's discount is computed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRule {
    /// `value` is a percentage of the subtotal (0-100)
    Percentage,
    /// `value` is a fixed amount, capped at the subtotal
    Fixed,
}

impl DiscountRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountRule::Percentage => "percentage",
            DiscountRule::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(DiscountRule::Percentage),
            "fixed" => Some(DiscountRule::Fixed),
            _ => None,
        }
    }
}

/// A coupon / promotion definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub rule: DiscountRule,
    pub value: Decimal,
    pub currency: String,
    pub active: bool,
    /// Optional activity window; either bound may be open
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Total redemptions allowed across all users
    pub usage_limit: Option<i64>,
    /// Redemptions allowed per user
    pub per_user_limit: Option<i64>,
    /// Minimum cart subtotal required for the coupon to apply
    pub min_cart_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of validating a coupon against a cart.
///
/// An invalid coupon is expected user input, not a fault, so this is a
/// plain result carried in a 200 response rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Decimal>,
}

impl CouponValidation {
    pub fn applicable(discount_amount: Decimal) -> Self {
        Self {
            valid: true,
            message: "Coupon applied".to_string(),
            discount_amount: Some(discount_amount),
        }
    }

    /// The uniform failure result. Individual reasons are logged server-side
    /// but not distinguished to the end user.
    pub fn not_applicable() -> Self {
        Self {
            valid: false,
            message: "Coupon is not applicable".to_string(),
            discount_amount: None,
        }
    }
}
