//! Coupon / promotion evaluator.
//!
//! Validation short-circuits on the first failing check; every failure maps
//! to the same uniform "not applicable" result so callers never leak the
//! reason to the end user. The specific reason is logged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{Coupon, CouponValidation, DiscountRule};
use shared::validation::{calculate_discount, clamp_discount};

/// Coupon evaluation service
#[derive(Clone)]
pub struct CouponService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    rule: String,
    value: Decimal,
    currency: String,
    active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<i64>,
    per_user_limit: Option<i64>,
    min_cart_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_model(self) -> AppResult<Coupon> {
        let rule = DiscountRule::parse(&self.rule)
            .ok_or_else(|| AppError::Internal(format!("bad discount rule: {}", self.rule)))?;
        Ok(Coupon {
            id: self.id,
            code: self.code,
            rule,
            value: self.value,
            currency: self.currency,
            active: self.active,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            usage_limit: self.usage_limit,
            per_user_limit: self.per_user_limit,
            min_cart_amount: self.min_cart_amount,
            created_at: self.created_at,
        })
    }
}

impl CouponService {
    /// Create a new CouponService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Validate a code against a cart and compute its discount.
    ///
    /// Check order (first failure wins): code exists and is active; current
    /// time inside the activity window; global usage limit; per-user usage
    /// limit; minimum-cart-amount condition. Any failure returns the uniform
    /// not-applicable result, never an error.
    pub async fn validate_and_calculate(
        &self,
        code: &str,
        cart_subtotal: Decimal,
        currency: &str,
        user_id: Option<Uuid>,
    ) -> AppResult<CouponValidation> {
        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            SELECT id, code, rule, value, currency, active, starts_at, ends_at,
                   usage_limit, per_user_limit, min_cart_amount, created_at
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        let coupon = match row {
            Some(row) => row.into_model()?,
            None => {
                tracing::debug!(code, "coupon rejected: unknown code");
                return Ok(CouponValidation::not_applicable());
            }
        };

        if !coupon.active {
            tracing::debug!(code, "coupon rejected: inactive");
            return Ok(CouponValidation::not_applicable());
        }

        let now = Utc::now();
        if coupon.starts_at.is_some_and(|at| now < at)
            || coupon.ends_at.is_some_and(|at| now > at)
        {
            tracing::debug!(code, "coupon rejected: outside activity window");
            return Ok(CouponValidation::not_applicable());
        }

        // Fixed-amount coupons are currency-bound; percentages are not
        if coupon.rule == DiscountRule::Fixed && coupon.currency != currency {
            tracing::debug!(code, currency, "coupon rejected: currency mismatch");
            return Ok(CouponValidation::not_applicable());
        }

        if let Some(limit) = coupon.usage_limit {
            let used: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1")
                    .bind(coupon.id)
                    .fetch_one(&self.db)
                    .await?;
            if used >= limit {
                tracing::debug!(code, used, limit, "coupon rejected: global limit reached");
                return Ok(CouponValidation::not_applicable());
            }
        }

        if let (Some(limit), Some(user_id)) = (coupon.per_user_limit, user_id) {
            let used: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2",
            )
            .bind(coupon.id)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
            if used >= limit {
                tracing::debug!(code, %user_id, "coupon rejected: per-user limit reached");
                return Ok(CouponValidation::not_applicable());
            }
        }

        if let Some(minimum) = coupon.min_cart_amount {
            if cart_subtotal < minimum {
                tracing::debug!(code, %cart_subtotal, %minimum, "coupon rejected: below minimum");
                return Ok(CouponValidation::not_applicable());
            }
        }

        let discount = clamp_discount(
            calculate_discount(coupon.rule, coupon.value, cart_subtotal),
            cart_subtotal,
        );

        Ok(CouponValidation::applicable(discount))
    }
}
