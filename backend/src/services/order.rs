//! Order placement orchestrator.
//!
//! Converts a validated active cart into a durable order:
//! validate -> create order (pending_payment) -> reserve stock -> consume
//! stock -> convert cart, with synchronous compensation when a later step
//! fails: holds still active are released, consumed stock is returned to
//! the pool, the order transitions to cancelled with a history row, and an
//! OrderCancelled event is emitted before the error returns. The cancelled
//! order row is kept as an audit trail.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::config::CheckoutConfig;
use crate::error::{AppError, AppResult};
use crate::external::{CatalogClient, DomainEvent, PgEventSink};
use crate::services::availability::AvailabilityService;
use crate::services::cart::CartService;
use crate::services::coupon::CouponService;
use crate::services::stock::{ReserveInput, StockLedgerService};
use shared::models::{
    AddressSnapshot, CartStatus, Order, OrderLine, OrderStatus, OrderStatusHistoryEntry,
    ReservationSource,
};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};

/// Order placement and lifecycle service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    carts: CartService,
    availability: AvailabilityService,
    stock: StockLedgerService,
    coupons: CouponService,
    catalog: CatalogClient,
    events: PgEventSink,
}

/// Input for placing an order from a cart
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderInput {
    pub cart_id: Uuid,
    /// Required when the cart belongs to a guest
    #[validate(email)]
    pub guest_email: Option<String>,
    pub billing_address: Option<AddressSnapshot>,
    pub shipping_address: Option<AddressSnapshot>,
    pub shipping_method: Option<String>,
    /// Supplied by the checkout flow, not computed by the cart
    pub tax: Option<Decimal>,
    pub shipping: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    guest_email: Option<String>,
    status: String,
    currency: String,
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    coupon_code: Option<String>,
    billing_address: Option<serde_json::Value>,
    shipping_address: Option<serde_json::Value>,
    shipping_method: Option<String>,
    cart_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_model(self, lines: Vec<OrderLine>) -> AppResult<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("bad order status: {}", self.status)))?;
        let parse_address = |value: Option<serde_json::Value>| -> AppResult<Option<AddressSnapshot>> {
            value
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| AppError::Internal(format!("bad address snapshot: {}", e)))
        };
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            guest_email: self.guest_email,
            status,
            currency: self.currency,
            subtotal: self.subtotal,
            discount: self.discount,
            tax: self.tax,
            shipping: self.shipping,
            total: self.total,
            coupon_code: self.coupon_code,
            billing_address: parse_address(self.billing_address)?,
            shipping_address: parse_address(self.shipping_address)?,
            shipping_method: self.shipping_method,
            lines,
            cart_id: self.cart_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    variant_id: Option<Uuid>,
    product_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    line_total: Decimal,
}

impl From<OrderLineRow> for OrderLine {
    fn from(r: OrderLineRow) -> Self {
        OrderLine {
            id: r.id,
            order_id: r.order_id,
            variant_id: r.variant_id,
            product_name: r.product_name,
            sku: r.sku,
            quantity: r.quantity,
            unit_price: r.unit_price,
            discount_amount: r.discount_amount,
            tax_amount: r.tax_amount,
            line_total: r.line_total,
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    order_id: Uuid,
    from_status: Option<String>,
    to_status: String,
    actor: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_model(self) -> AppResult<OrderStatusHistoryEntry> {
        let parse = |s: &str| {
            OrderStatus::parse(s)
                .ok_or_else(|| AppError::Internal(format!("bad order status: {}", s)))
        };
        Ok(OrderStatusHistoryEntry {
            id: self.id,
            order_id: self.order_id,
            from_status: self.from_status.as_deref().map(parse).transpose()?,
            to_status: parse(&self.to_status)?,
            actor: self.actor,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, checkout: &CheckoutConfig) -> Self {
        Self {
            carts: CartService::new(db.clone(), checkout),
            availability: AvailabilityService::new(db.clone()),
            stock: StockLedgerService::new(db.clone()),
            coupons: CouponService::new(db.clone()),
            catalog: CatalogClient::new(db.clone()),
            events: PgEventSink::new(db.clone()),
            db,
        }
    }

    /// Place an order from an active cart.
    pub async fn place_order(&self, input: PlaceOrderInput) -> AppResult<Order> {
        input.validate().map_err(|e| AppError::Validation {
            field: "input".to_string(),
            message: e.to_string(),
        })?;

        let cart = self.carts.get(input.cart_id).await?;
        match cart.status {
            CartStatus::Active => {}
            CartStatus::Converted => {
                return Err(AppError::BusinessRule(
                    "Cart has already been converted to an order".to_string(),
                ))
            }
            CartStatus::Abandoned => {
                return Err(AppError::BusinessRule("Cart has been abandoned".to_string()))
            }
        }
        if cart.items.is_empty() {
            return Err(AppError::BusinessRule("Cart is empty".to_string()));
        }

        let user_id = cart.owner.user_id();
        if user_id.is_none() && input.guest_email.is_none() {
            return Err(AppError::Validation {
                field: "guest_email".to_string(),
                message: "Guest orders require an email address".to_string(),
            });
        }

        // Pre-commit availability check across every line; placement never
        // partially succeeds on stock
        let demand: Vec<(Uuid, i64)> = cart
            .items
            .iter()
            .map(|item| (item.variant_id, item.quantity as i64))
            .collect();
        let results = self.availability.check(&demand, None).await?;
        if let Some(short) = results.iter().find(|r| !r.sufficient) {
            return Err(AppError::InsufficientStock {
                variant_id: short.variant_id,
                requested: short.requested,
                available: short.available,
            });
        }

        // Re-validate the coupon against the final subtotal; a snapshot that
        // no longer applies zeroes the discount instead of failing placement
        let totals = cart.totals();
        let (discount, coupon_code) = match &cart.coupon {
            Some(snapshot) => {
                let validation = self
                    .coupons
                    .validate_and_calculate(&snapshot.code, totals.subtotal, &cart.currency, user_id)
                    .await?;
                match validation.discount_amount.filter(|_| validation.valid) {
                    Some(discount) => (discount, Some(snapshot.code.clone())),
                    None => {
                        tracing::warn!(
                            cart_id = %cart.id,
                            code = %snapshot.code,
                            "coupon no longer applies at placement, placing without discount"
                        );
                        (Decimal::ZERO, None)
                    }
                }
            }
            None => (Decimal::ZERO, None),
        };

        let tax = input.tax.unwrap_or_default();
        let shipping = input.shipping.unwrap_or_default();
        let total = totals.subtotal - discount + tax + shipping;

        // Create the order aggregate with frozen snapshots
        let mut tx = self.db.begin().await?;
        let order_number = Self::next_order_number(&mut tx).await?;

        let order_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO orders
                (order_number, user_id, guest_email, status, currency, subtotal, discount,
                 tax, shipping, total, coupon_code, billing_address, shipping_address,
                 shipping_method, cart_id)
            VALUES ($1, $2, $3, 'pending_payment', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(&order_number)
        .bind(user_id)
        .bind(&input.guest_email)
        .bind(&cart.currency)
        .bind(totals.subtotal)
        .bind(discount)
        .bind(tax)
        .bind(shipping)
        .bind(total)
        .bind(&coupon_code)
        .bind(serialize_address(&input.billing_address)?)
        .bind(serialize_address(&input.shipping_address)?)
        .bind(&input.shipping_method)
        .bind(cart.id)
        .fetch_one(&mut *tx)
        .await?;

        for item in &cart.items {
            let variant = self.catalog.get_variant(item.variant_id).await?;
            let line_total = item.line_total();
            sqlx::query(
                r#"
                INSERT INTO order_lines
                    (order_id, variant_id, product_name, sku, quantity, unit_price,
                     discount_amount, tax_amount, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
                "#,
            )
            .bind(order_id)
            .bind(item.variant_id)
            .bind(&variant.name)
            .bind(&variant.sku)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount_amount)
            .bind(line_total)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor, reason)
            VALUES ($1, NULL, 'pending_payment', 'system', 'order placed')
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Hold stock per line against the new order. A failure here is the
        // race window since the pre-commit check; compensate and propagate.
        // No TTL: the holds are consumed below within this request, so the
        // expiry sweep must never be able to drop them first.
        let mut reserved: Vec<Uuid> = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let attempt = self
                .stock
                .reserve(ReserveInput {
                    variant_id: item.variant_id,
                    warehouse_id: None,
                    quantity: item.quantity as i64,
                    source: ReservationSource::Order,
                    source_id: order_id,
                    ttl: None,
                })
                .await;

            match attempt {
                Ok(reservation) => reserved.push(reservation.id),
                Err(err) => {
                    tracing::warn!(
                        %order_id,
                        variant_id = %item.variant_id,
                        error = %err,
                        "stock reservation failed during placement, compensating"
                    );
                    self.compensate(order_id, &order_number, &reserved, "stock reservation failed")
                        .await?;
                    return Err(AppError::BusinessRule("Could not reserve stock".to_string()));
                }
            }
        }

        // Placement consumes immediately; there is no separate
        // fulfillment-hold step. The permanent out-movements are written
        // here, before the cart converts.
        for &reservation_id in &reserved {
            if let Err(err) = self.stock.consume(reservation_id).await {
                tracing::warn!(
                    %order_id,
                    %reservation_id,
                    error = %err,
                    "stock consumption failed during placement, compensating"
                );
                self.compensate(order_id, &order_number, &reserved, "stock consumption failed")
                    .await?;
                return Err(AppError::BusinessRule("Could not allocate stock".to_string()));
            }
        }

        // The cart converts exactly once; losing this race means another
        // placement won and this order must be unwound
        if !self.carts.mark_converted(cart.id).await? {
            self.compensate(order_id, &order_number, &reserved, "cart already converted")
                .await?;
            return Err(AppError::BusinessRule(
                "Cart has already been converted to an order".to_string(),
            ));
        }

        // The order is durably placed and the cart converted; a sink hiccup
        // here must not surface as a placement failure.
        let placed = DomainEvent::OrderPlaced {
            order_id,
            order_number: order_number.clone(),
            total,
            currency: cart.currency.clone(),
        };
        if let Err(err) = self.events.publish(&placed).await {
            tracing::error!(%order_id, error = %err, "failed to record order_placed event");
        }
        if let Some(code) = coupon_code {
            let redeemed = DomainEvent::CouponRedeemed {
                code,
                user_id,
                order_id,
                discount_amount: discount,
            };
            if let Err(err) = self.events.publish(&redeemed).await {
                tracing::error!(%order_id, error = %err, "failed to record coupon_redeemed event");
            }
        }

        tracing::info!(%order_id, %order_number, "order placed");
        self.get_order(order_id).await
    }

    /// Fetch an order with its line snapshots.
    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, order_number, user_id, guest_email, status, currency, subtotal,
                   discount, tax, shipping, total, coupon_code, billing_address,
                   shipping_address, shipping_method, cart_id, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let lines = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT id, order_id, variant_id, product_name, sku, quantity, unit_price,
                   discount_amount, tax_amount, line_total
            FROM order_lines
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(OrderLine::from)
        .collect();

        row.into_model(lines)
    }

    /// Orders belonging to a user, newest first, paginated.
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Order>> {
        let total_items: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;

        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            orders.push(self.get_order(id).await?);
        }

        Ok(PaginatedResponse {
            data: orders,
            pagination: PaginationMeta::new(pagination, total_items as u64),
        })
    }

    /// Status transition audit trail for an order, oldest first.
    pub async fn status_history(&self, order_id: Uuid) -> AppResult<Vec<OrderStatusHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, order_id, from_status, to_status, actor, reason, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(HistoryRow::into_model).collect()
    }

    /// Transition an order through its state machine, appending history.
    ///
    /// Stock is already consumed at placement, so `paid` carries no stock
    /// action; `cancelled` restocks the order and emits OrderCancelled.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;

        let (current_raw, order_number) = sqlx::query_as::<_, (String, String)>(
            "SELECT status, order_number FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let current = OrderStatus::parse(&current_raw)
            .ok_or_else(|| AppError::Internal(format!("bad order status: {}", current_raw)))?;
        current
            .transition_to(next)
            .map_err(|e| AppError::InvalidStateTransition(e.to_string()))?;

        sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next.as_str())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id)
        .bind(current.as_str())
        .bind(next.as_str())
        .bind(actor)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Stock was consumed at placement, so only cancellation has a stock
        // side effect: any stray active hold is released and the consumed
        // units go back via reversing in-movements.
        if next == OrderStatus::Cancelled {
            let reservations = self
                .stock
                .reservations_for_source(ReservationSource::Order, order_id)
                .await?;
            for reservation in reservations {
                self.stock.release(reservation.id).await?;
            }
            self.stock
                .restock(ReservationSource::Order, order_id)
                .await?;
            self.events
                .publish(&DomainEvent::OrderCancelled {
                    order_id,
                    order_number,
                    reason: reason.unwrap_or("cancelled").to_string(),
                })
                .await?;
        }

        tracing::info!(%order_id, status = next.as_str(), "order status updated");
        self.get_order(order_id).await
    }

    /// Unwind a partially placed order: release the holds still active,
    /// restock anything already consumed, cancel the order with a history
    /// row, and emit OrderCancelled. Runs to completion or the whole
    /// request fails hard.
    async fn compensate(
        &self,
        order_id: Uuid,
        order_number: &str,
        reservation_ids: &[Uuid],
        reason: &str,
    ) -> AppResult<()> {
        for &id in reservation_ids {
            self.stock.release(id).await?;
        }
        self.stock
            .restock(ReservationSource::Order, order_id)
            .await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE orders SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor, reason)
            VALUES ($1, 'pending_payment', 'cancelled', 'system', $2)
            "#,
        )
        .bind(order_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.events
            .publish(&DomainEvent::OrderCancelled {
                order_id,
                order_number: order_number.to_string(),
                reason: reason.to_string(),
            })
            .await?;

        tracing::info!(%order_id, reason, "order compensated");
        Ok(())
    }

    /// Next presentable order number, e.g. "ORD-2026-000042".
    async fn next_order_number(tx: &mut Transaction<'_, Postgres>) -> AppResult<String> {
        let sequence: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&mut **tx)
            .await?;
        Ok(format!("ORD-{}-{:06}", Utc::now().year(), sequence))
    }
}

fn serialize_address(address: &Option<AddressSnapshot>) -> AppResult<Option<serde_json::Value>> {
    address
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(format!("bad address input: {}", e)))
}
