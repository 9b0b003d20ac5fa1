use async_trait::async_trait;
use common::{AdjustmentKey, Money, ProductId};
use domain::{AdjustmentOutcome, AdjustmentReceipt, NewProduct, Product, StockAdjustment};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{InventoryError, InventoryStore, Result};

/// PostgreSQL-backed catalog.
///
/// Stock changes are a single conditional `UPDATE` recorded together with
/// the adjustment key in one transaction.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/catalog")
            .run(&self.pool)
            .await
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock_quantity")?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            stock_quantity: to_stock(stock)?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }
}

fn to_stock(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| InventoryError::Corrupt(format!("stock quantity out of range: {value}")))
}

fn parse_outcome(value: &str) -> Result<AdjustmentOutcome> {
    match value {
        "applied" => Ok(AdjustmentOutcome::Applied),
        "voided" => Ok(AdjustmentOutcome::Voided),
        other => Err(InventoryError::Corrupt(format!(
            "unknown adjustment outcome: {other}"
        ))),
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    async fn add_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, stock_quantity, unit_price_cents)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&product.name)
        .bind(i64::from(product.stock_quantity))
        .bind(product.unit_price.cents())
        .fetch_one(&self.pool)
        .await?;

        Ok(Product {
            id: ProductId::new(id),
            name: product.name,
            stock_quantity: product.stock_quantity,
            unit_price: product.unit_price,
        })
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        sqlx::query(
            "SELECT id, name, stock_quantity, unit_price_cents FROM products WHERE id = $1",
        )
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_product)
        .transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        sqlx::query("SELECT id, name, stock_quantity, unit_price_cents FROM products ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::row_to_product)
            .collect()
    }

    #[tracing::instrument(skip(self), fields(product_id = %adjustment.product_id, delta = adjustment.delta))]
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<AdjustmentReceipt> {
        if adjustment.delta == 0 {
            return Err(InventoryError::InvalidAdjustment(
                "delta must not be zero".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Claiming the key first blocks a concurrent duplicate until this
        // transaction ends.
        let claimed = sqlx::query(
            r#"
            INSERT INTO stock_adjustments (key, delta, outcome)
            VALUES ($1, $2, 'applied')
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(adjustment.key.as_uuid())
        .bind(adjustment.delta)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            let row = sqlx::query(
                "SELECT outcome, product_id, resulting_stock FROM stock_adjustments WHERE key = $1",
            )
            .bind(adjustment.key.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
            let outcome: String = row.try_get("outcome")?;
            if parse_outcome(&outcome)? == AdjustmentOutcome::Voided {
                return Err(InventoryError::AdjustmentVoided(adjustment.key));
            }
            let product_id: Option<i64> = row.try_get("product_id")?;
            let stock: Option<i64> = row.try_get("resulting_stock")?;
            let (Some(product_id), Some(stock)) = (product_id, stock) else {
                return Err(InventoryError::Corrupt(format!(
                    "applied adjustment {} has no result",
                    adjustment.key
                )));
            };
            tracing::debug!(key = %adjustment.key, "duplicate adjustment, returning original receipt");
            return Ok(AdjustmentReceipt {
                key: adjustment.key,
                product_id: ProductId::new(product_id),
                stock_quantity: to_stock(stock)?,
            });
        }

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2
            WHERE id = $1 AND stock_quantity + $2 >= 0
            RETURNING stock_quantity
            "#,
        )
        .bind(adjustment.product_id.as_i64())
        .bind(adjustment.delta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stock) = updated else {
            // Dropping the transaction releases the key claim.
            let available: Option<i64> =
                sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                    .bind(adjustment.product_id.as_i64())
                    .fetch_optional(&mut *tx)
                    .await?;
            return match available {
                None => Err(InventoryError::ProductNotFound(adjustment.product_id)),
                Some(available) => Err(InventoryError::InsufficientStock {
                    product_id: adjustment.product_id,
                    requested: adjustment.quantity(),
                    available: to_stock(available)?,
                }),
            };
        };

        sqlx::query(
            "UPDATE stock_adjustments SET product_id = $2, resulting_stock = $3 WHERE key = $1",
        )
        .bind(adjustment.key.as_uuid())
        .bind(adjustment.product_id.as_i64())
        .bind(stock)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AdjustmentReceipt {
            key: adjustment.key,
            product_id: adjustment.product_id,
            stock_quantity: to_stock(stock)?,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_adjustment(&self, key: AdjustmentKey) -> Result<AdjustmentOutcome> {
        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (key, outcome)
            VALUES ($1, 'voided')
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key.as_uuid())
        .execute(&self.pool)
        .await?;

        let outcome: String =
            sqlx::query_scalar("SELECT outcome FROM stock_adjustments WHERE key = $1")
                .bind(key.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        parse_outcome(&outcome)
    }
}
