//! Domain event sink.
//!
//! The orchestrator writes events synchronously; fan-out (notifications,
//! audit, analytics) happens downstream off the `domain_events` table.
//! Coupon redemptions are also recorded here, feeding the usage-limit
//! counting in the coupon evaluator.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Events emitted by the commerce core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        total: Decimal,
        currency: String,
    },
    OrderCancelled {
        order_id: Uuid,
        order_number: String,
        reason: String,
    },
    CouponRedeemed {
        code: String,
        user_id: Option<Uuid>,
        order_id: Uuid,
        discount_amount: Decimal,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "order_placed",
            DomainEvent::OrderCancelled { .. } => "order_cancelled",
            DomainEvent::CouponRedeemed { .. } => "coupon_redeemed",
        }
    }
}

/// Event sink appending to the domain_events table
#[derive(Clone)]
pub struct PgEventSink {
    db: PgPool,
}

impl PgEventSink {
    /// Create a new PgEventSink instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record an event. For `CouponRedeemed` this also writes the redemption
    /// row the per-user and global usage limits count against.
    pub async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = serde_json::to_value(event)
            .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

        sqlx::query("INSERT INTO domain_events (event_type, payload) VALUES ($1, $2)")
            .bind(event.event_type())
            .bind(&payload)
            .execute(&self.db)
            .await?;

        if let DomainEvent::CouponRedeemed {
            code,
            user_id,
            order_id,
            discount_amount,
        } = event
        {
            sqlx::query(
                r#"
                INSERT INTO coupon_redemptions (coupon_id, user_id, order_id, discount_amount)
                SELECT c.id, $2, $3, $4 FROM coupons c WHERE c.code = $1
                "#,
            )
            .bind(code)
            .bind(user_id)
            .bind(order_id)
            .bind(discount_amount)
            .execute(&self.db)
            .await?;
        }

        tracing::info!(event = event.event_type(), "domain event published");
        Ok(())
    }
}
