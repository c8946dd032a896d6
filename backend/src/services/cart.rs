//! Cart engine: line mutations with availability revalidation, price
//! snapshots, quantity caps, and coupon apply/remove.
//!
//! Mutation errors leave the cart unchanged; totals are recomputed on read
//! rather than stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::error::{AppError, AppResult};
use crate::external::CatalogClient;
use crate::services::availability::AvailabilityService;
use crate::services::coupon::CouponService;
use shared::models::{Cart, CartItem, CartStatus, CouponSnapshot, CouponValidation};
use shared::types::OwnerRef;
use shared::validation::cap_line_quantity;

/// Cart engine service
#[derive(Clone)]
pub struct CartService {
    db: PgPool,
    catalog: CatalogClient,
    availability: AvailabilityService,
    coupons: CouponService,
    max_line_quantity: i32,
}

#[derive(Debug, FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    guest_token: Option<String>,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_model(self, items: Vec<CartItem>, coupon: Option<CouponSnapshot>) -> AppResult<Cart> {
        let status = CartStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("bad cart status: {}", self.status)))?;
        let owner = match (self.user_id, self.guest_token) {
            (Some(user_id), None) => OwnerRef::User { user_id },
            (None, Some(guest_token)) => OwnerRef::Guest { guest_token },
            _ => {
                return Err(AppError::Internal(format!(
                    "cart {} violates the user-xor-guest owner rule",
                    self.id
                )))
            }
        };
        Ok(Cart {
            id: self.id,
            owner,
            currency: self.currency,
            status,
            items,
            coupon,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CartItemRow {
    id: Uuid,
    cart_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    currency: String,
    discount_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(r: CartItemRow) -> Self {
        CartItem {
            id: r.id,
            cart_id: r.cart_id,
            variant_id: r.variant_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            currency: r.currency,
            discount_amount: r.discount_amount,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl CartService {
    /// Create a new CartService instance
    pub fn new(db: PgPool, checkout: &CheckoutConfig) -> Self {
        Self {
            catalog: CatalogClient::new(db.clone()),
            availability: AvailabilityService::new(db.clone()),
            coupons: CouponService::new(db.clone()),
            db,
            max_line_quantity: checkout.max_line_quantity,
        }
    }

    /// Fetch a cart with its items (insertion order) and coupon snapshot.
    pub async fn get(&self, cart_id: Uuid) -> AppResult<Cart> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, guest_token, currency, status, created_at, updated_at
            FROM carts
            WHERE id = $1
            "#,
        )
        .bind(cart_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart".to_string()))?;

        let items = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, cart_id, variant_id, quantity, unit_price, currency,
                   discount_amount, created_at, updated_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(CartItem::from)
        .collect();

        let coupon = sqlx::query_as::<_, (String, Decimal, String)>(
            "SELECT code, discount_amount, currency FROM cart_coupons WHERE cart_id = $1",
        )
        .bind(cart_id)
        .fetch_optional(&self.db)
        .await?
        .map(|(code, discount_amount, currency)| CouponSnapshot {
            code,
            discount_amount,
            currency,
        });

        row.into_model(items, coupon)
    }

    /// Find the owner's active cart, creating it lazily on first access.
    pub async fn get_or_create(&self, owner: &OwnerRef, currency: &str) -> AppResult<Cart> {
        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM carts
            WHERE status = 'active'
              AND (($1::uuid IS NOT NULL AND user_id = $1)
                OR ($2::text IS NOT NULL AND guest_token = $2))
            "#,
        )
        .bind(owner.user_id())
        .bind(owner.guest_token())
        .fetch_optional(&self.db)
        .await?;

        if let Some(id) = existing {
            return self.get(id).await;
        }

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO carts (user_id, guest_token, currency, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING id
            "#,
        )
        .bind(owner.user_id())
        .bind(owner.guest_token())
        .bind(currency)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(cart_id = %id, "cart created");
        self.get(id).await
    }

    /// Add a variant to the cart, merging into an existing line.
    ///
    /// Oversized quantities are capped at the per-line maximum, not
    /// rejected. Availability is checked for the post-merge total, and the
    /// unit price snapshot is taken in the cart's currency with no
    /// cross-currency fallback.
    pub async fn add_item(&self, cart_id: Uuid, variant_id: Uuid, quantity: i32) -> AppResult<Cart> {
        if quantity <= 0 {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be positive".to_string(),
            });
        }

        let cart = self.get(cart_id).await?;
        self.require_active(&cart)?;

        let variant = self.catalog.get_variant(variant_id).await?;
        if !variant.sellable {
            return Err(AppError::BusinessRule(format!(
                "Variant {} is not sellable",
                variant_id
            )));
        }

        let existing = cart
            .items
            .iter()
            .find(|item| item.variant_id == variant_id)
            .map(|item| item.quantity)
            .unwrap_or(0);
        let new_total = cap_line_quantity(
            existing.saturating_add(quantity),
            self.max_line_quantity,
        );

        let check = self
            .availability
            .check_one(variant_id, new_total as i64, None)
            .await?;
        if !check.sufficient {
            return Err(AppError::InsufficientStock {
                variant_id,
                requested: new_total as i64,
                available: check.available,
            });
        }

        // Exact-currency only in cart context
        let price = self.catalog.price_of(variant_id, &cart.currency, false).await?;

        // Merge-by-variant upsert; the price snapshot from first add wins.
        // The merge arithmetic runs inside the statement so two concurrent
        // adds both land instead of the later write clobbering the earlier.
        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, variant_id, quantity, unit_price, currency)
            VALUES ($1, $2, LEAST($3, $4), $5, $6)
            ON CONFLICT (cart_id, variant_id)
                DO UPDATE SET
                    quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4),
                    updated_at = NOW()
            "#,
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(self.max_line_quantity)
        .bind(price.amount)
        .bind(&price.currency)
        .execute(&self.db)
        .await?;

        self.touch(cart_id).await?;
        self.get(cart_id).await
    }

    /// Change a line's quantity. Zero removes the line by design; any other
    /// value is capped and re-checked against availability for the new
    /// total before applying.
    pub async fn update_item_quantity(&self, cart_item_id: Uuid, quantity: i32) -> AppResult<Cart> {
        let (cart_id, variant_id) = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT cart_id, variant_id FROM cart_items WHERE id = $1",
        )
        .bind(cart_item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item".to_string()))?;

        let cart = self.get(cart_id).await?;
        self.require_active(&cart)?;

        if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(cart_item_id)
                .execute(&self.db)
                .await?;
            self.touch(cart_id).await?;
            return self.get(cart_id).await;
        }

        let capped = cap_line_quantity(quantity, self.max_line_quantity);
        let check = self
            .availability
            .check_one(variant_id, capped as i64, None)
            .await?;
        if !check.sufficient {
            return Err(AppError::InsufficientStock {
                variant_id,
                requested: capped as i64,
                available: check.available,
            });
        }

        sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = NOW() WHERE id = $2")
            .bind(capped)
            .bind(cart_item_id)
            .execute(&self.db)
            .await?;

        self.touch(cart_id).await?;
        self.get(cart_id).await
    }

    /// Remove a line from the cart.
    pub async fn remove_item(&self, cart_item_id: Uuid) -> AppResult<Cart> {
        let cart_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT cart_id FROM cart_items WHERE id = $1",
        )
        .bind(cart_item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item".to_string()))?;

        let cart = self.get(cart_id).await?;
        self.require_active(&cart)?;

        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(cart_item_id)
            .execute(&self.db)
            .await?;

        self.touch(cart_id).await?;
        self.get(cart_id).await
    }

    /// Apply a coupon code to the cart.
    ///
    /// An invalid code is a normal outcome: the validation result comes back
    /// with `valid: false` and the cart stays unchanged.
    pub async fn apply_coupon(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> AppResult<(Cart, CouponValidation)> {
        let cart = self.get(cart_id).await?;
        self.require_active(&cart)?;

        let subtotal = cart.totals().subtotal;
        let validation = self
            .coupons
            .validate_and_calculate(code, subtotal, &cart.currency, cart.owner.user_id())
            .await?;

        let Some(discount) = validation.discount_amount.filter(|_| validation.valid) else {
            return Ok((cart, validation));
        };

        // One coupon per cart, enforced by the cart_coupons primary key
        sqlx::query(
            r#"
            INSERT INTO cart_coupons (cart_id, code, discount_amount, currency)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id)
                DO UPDATE SET code = $2, discount_amount = $3, currency = $4, applied_at = NOW()
            "#,
        )
        .bind(cart_id)
        .bind(code)
        .bind(discount)
        .bind(&cart.currency)
        .execute(&self.db)
        .await?;

        self.touch(cart_id).await?;
        let cart = self.get(cart_id).await?;
        Ok((cart, validation))
    }

    /// Remove any applied coupon. Idempotent.
    pub async fn remove_coupon(&self, cart_id: Uuid) -> AppResult<Cart> {
        let cart = self.get(cart_id).await?;
        self.require_active(&cart)?;

        sqlx::query("DELETE FROM cart_coupons WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.db)
            .await?;

        self.touch(cart_id).await?;
        self.get(cart_id).await
    }

    /// Mark a cart converted; succeeds at most once per cart.
    ///
    /// Returns `false` when a concurrent placement already converted it.
    pub async fn mark_converted(&self, cart_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE carts SET status = 'converted', updated_at = NOW() WHERE id = $1 AND status = 'active'",
        )
        .bind(cart_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn require_active(&self, cart: &Cart) -> AppResult<()> {
        match cart.status {
            CartStatus::Active => Ok(()),
            CartStatus::Converted => Err(AppError::BusinessRule(
                "Cart has already been converted to an order".to_string(),
            )),
            CartStatus::Abandoned => {
                Err(AppError::BusinessRule("Cart has been abandoned".to_string()))
            }
        }
    }

    async fn touch(&self, cart_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
