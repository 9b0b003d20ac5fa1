use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, LineNumber, Money, OrderId, ProductId, ReconciliationId};
use domain::{Order, OrderHeader, OrderLine, OrderStatus, ReleaseState};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderStore, OrderStoreError, ReconciliationEntry, Result};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/orders")
            .run(&self.pool)
            .await
    }

    fn row_to_header(row: &PgRow) -> Result<OrderHeader> {
        let status: String = row.try_get("status")?;
        Ok(OrderHeader {
            id: OrderId::new(row.try_get("id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        let line_number: i32 = row.try_get("line_number")?;
        let quantity: i64 = row.try_get("quantity")?;
        let release_state: String = row.try_get("release_state")?;
        Ok(OrderLine {
            line_number: LineNumber::new(to_u32(i64::from(line_number), "line_number")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: to_u32(quantity, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            release_state: release_state.parse::<ReleaseState>()?,
        })
    }

    fn row_to_reconciliation(row: &PgRow) -> Result<ReconciliationEntry> {
        let kind: String = row.try_get("kind")?;
        let quantity: i64 = row.try_get("quantity")?;
        Ok(ReconciliationEntry {
            id: ReconciliationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: to_u32(quantity, "quantity")?,
            kind: kind.parse()?,
            reason: row.try_get("reason")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn move_line(
        &self,
        order_id: OrderId,
        line_number: LineNumber,
        from: ReleaseState,
        to: ReleaseState,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE order_lines
            SET release_state = $4
            WHERE order_id = $1 AND line_number = $2 AND release_state = $3
            "#,
        )
        .bind(order_id.as_i64())
        .bind(line_number_param(line_number))
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn line_exists(&self, order_id: OrderId, line_number: LineNumber) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM order_lines WHERE order_id = $1 AND line_number = $2)",
        )
        .bind(order_id.as_i64())
        .bind(line_number_param(line_number))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| OrderStoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn line_number_param(line_number: LineNumber) -> i32 {
    i32::try_from(line_number.as_u32()).unwrap_or(i32::MAX)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self))]
    async fn next_order_id(&self) -> Result<OrderId> {
        let id: i64 = sqlx::query_scalar("SELECT nextval('orders_id_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(OrderId::new(id))
    }

    #[tracing::instrument(skip(self, line), fields(line_number = %line.line_number))]
    async fn insert_line(&self, order_id: OrderId, line: &OrderLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_lines
                (order_id, line_number, product_id, product_name, quantity, unit_price_cents, release_state)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM orders WHERE id = $1)
            "#,
        )
        .bind(order_id.as_i64())
        .bind(line_number_param(line.line_number))
        .bind(line.product_id.as_i64())
        .bind(&line.product_name)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.cents())
        .bind(line.release_state.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return OrderStoreError::DuplicateLine {
                    order_id,
                    line_number: line.line_number,
                };
            }
            OrderStoreError::Database(e)
        })
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(OrderStoreError::AlreadyCommitted(order_id))
            } else {
                Ok(())
            }
        })
    }

    #[tracing::instrument(skip(self))]
    async fn discard_lines(&self, order_id: OrderId) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM order_lines
            WHERE order_id = $1 AND NOT EXISTS (SELECT 1 FROM orders WHERE id = $1)
            "#,
        )
        .bind(order_id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, header), fields(order_id = %header.id))]
    async fn commit_order(&self, header: &OrderHeader) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(header.id.as_i64())
        .bind(header.customer_id.as_i64())
        .bind(header.status.as_str())
        .bind(header.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return OrderStoreError::AlreadyCommitted(header.id);
            }
            OrderStoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        // Header and lines from one snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let Some(row) = sqlx::query(
            "SELECT id, customer_id, status, created_at FROM orders WHERE id = $1",
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };
        let header = Self::row_to_header(&row)?;

        let line_rows = sqlx::query(
            r#"
            SELECT line_number, product_id, product_name, quantity, unit_price_cents, release_state
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_number ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let lines = line_rows
            .iter()
            .map(Self::row_to_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Order::from_parts(header, lines)))
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let mut tx = self.pool.begin().await?;
        // One snapshot for headers and lines.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let headers = sqlx::query(
            "SELECT id, customer_id, status, created_at FROM orders ORDER BY id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        let line_rows = sqlx::query(
            r#"
            SELECT l.order_id, l.line_number, l.product_id, l.product_name, l.quantity,
                   l.unit_price_cents, l.release_state
            FROM order_lines l
            JOIN orders o ON o.id = l.order_id
            ORDER BY l.order_id ASC, l.line_number ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut lines: BTreeMap<OrderId, Vec<OrderLine>> = BTreeMap::new();
        for row in &line_rows {
            let order_id = OrderId::new(row.try_get("order_id")?);
            lines.entry(order_id).or_default().push(Self::row_to_line(row)?);
        }

        headers
            .iter()
            .map(|row| {
                let header = Self::row_to_header(row)?;
                let items = lines.remove(&header.id).unwrap_or_default();
                Ok(Order::from_parts(header, items))
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(order_id.as_i64())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        match current {
            None => Err(OrderStoreError::OrderNotFound(order_id)),
            Some(actual) => Err(OrderStoreError::StatusConflict {
                order_id,
                expected: from,
                actual: actual.parse()?,
            }),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn begin_line_release(
        &self,
        order_id: OrderId,
        line_number: LineNumber,
    ) -> Result<bool> {
        let moved = self
            .move_line(
                order_id,
                line_number,
                ReleaseState::Held,
                ReleaseState::Releasing,
            )
            .await?;
        if moved == 1 {
            return Ok(true);
        }
        if self.line_exists(order_id, line_number).await? {
            Ok(false)
        } else {
            Err(OrderStoreError::LineStateConflict {
                order_id,
                line_number,
            })
        }
    }

    #[tracing::instrument(skip(self))]
    async fn finish_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()> {
        let moved = self
            .move_line(
                order_id,
                line_number,
                ReleaseState::Releasing,
                ReleaseState::Released,
            )
            .await?;
        if moved == 1 {
            Ok(())
        } else {
            Err(OrderStoreError::LineStateConflict {
                order_id,
                line_number,
            })
        }
    }

    #[tracing::instrument(skip(self))]
    async fn abort_line_release(&self, order_id: OrderId, line_number: LineNumber) -> Result<()> {
        let moved = self
            .move_line(
                order_id,
                line_number,
                ReleaseState::Releasing,
                ReleaseState::Held,
            )
            .await?;
        if moved == 1 {
            Ok(())
        } else {
            Err(OrderStoreError::LineStateConflict {
                order_id,
                line_number,
            })
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }

        let unreleased: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_lines WHERE order_id = $1 AND release_state <> 'released'",
        )
        .bind(order_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        if unreleased > 0 {
            return Err(OrderStoreError::UnreleasedLines {
                order_id,
                count: usize::try_from(unreleased).unwrap_or(usize::MAX),
            });
        }

        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, entry), fields(order_id = %entry.order_id, kind = %entry.kind))]
    async fn record_reconciliation(&self, entry: &ReconciliationEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_reconciliations (id, order_id, product_id, quantity, kind, reason, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.order_id.as_i64())
        .bind(entry.product_id.as_i64())
        .bind(i64::from(entry.quantity))
        .bind(entry.kind.as_str())
        .bind(&entry.reason)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_reconciliations(&self) -> Result<Vec<ReconciliationEntry>> {
        sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, kind, reason, recorded_at
            FROM order_reconciliations
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_reconciliation)
        .collect()
    }
}
