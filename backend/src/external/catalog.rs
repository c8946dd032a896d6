//! Catalog lookup collaborator.
//!
//! Product/category management is out of scope for this core; the cart and
//! order services only need variant existence, sellability, and price
//! lookups, served here from the catalog tables.

use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Catalog lookup client
#[derive(Clone)]
pub struct CatalogClient {
    db: PgPool,
}

/// Denormalized variant info used for order line snapshots
#[derive(Debug, Clone, FromRow)]
pub struct VariantInfo {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub sellable: bool,
}

/// A price in a concrete currency
#[derive(Debug, Clone, FromRow)]
pub struct VariantPrice {
    pub amount: Decimal,
    pub currency: String,
}

impl CatalogClient {
    /// Create a new CatalogClient instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Fetch variant info; `NotFound` if the variant does not exist.
    pub async fn get_variant(&self, variant_id: Uuid) -> AppResult<VariantInfo> {
        sqlx::query_as::<_, VariantInfo>(
            "SELECT id, sku, name, sellable FROM product_variants WHERE id = $1",
        )
        .bind(variant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Variant".to_string()))
    }

    /// Price of a variant in a currency.
    ///
    /// With `fallback` set, a missing exact-currency price falls back to any
    /// other currency the variant is priced in (standalone catalog lookups).
    /// Cart pricing passes `fallback = false`: a cart only ever prices in
    /// its own currency.
    pub async fn price_of(
        &self,
        variant_id: Uuid,
        currency: &str,
        fallback: bool,
    ) -> AppResult<VariantPrice> {
        let exact = sqlx::query_as::<_, VariantPrice>(
            "SELECT amount, currency FROM variant_prices WHERE variant_id = $1 AND currency = $2",
        )
        .bind(variant_id)
        .bind(currency)
        .fetch_optional(&self.db)
        .await?;

        if let Some(price) = exact {
            return Ok(price);
        }

        if fallback {
            let any = sqlx::query_as::<_, VariantPrice>(
                r#"
                SELECT amount, currency
                FROM variant_prices
                WHERE variant_id = $1
                ORDER BY currency
                LIMIT 1
                "#,
            )
            .bind(variant_id)
            .fetch_optional(&self.db)
            .await?;

            if let Some(price) = any {
                return Ok(price);
            }
        }

        Err(AppError::NoPriceAvailable {
            variant_id,
            currency: currency.to_string(),
        })
    }
}
