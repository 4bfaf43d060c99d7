use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MemberEmail, OrderId, OrderLineId, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::OrderStoreError;
use crate::order::{Order, OrderLine, OrderStatus};
use crate::store::OrderStore;

/// PostgreSQL-backed order store.
///
/// Each commit is one transaction covering the header row and all line rows.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_header(row: &PgRow) -> Result<Order, OrderStoreError> {
        let status: String = row.try_get("order_status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| OrderStoreError::Corrupt(format!("unknown order status {status}")))?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            member_email: MemberEmail::new(row.try_get::<String, _>("member_email")?),
            status,
            created_at,
            lines: Vec::new(),
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine, OrderStoreError> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| OrderStoreError::Corrupt(format!("negative quantity {quantity}")))?;

        Ok(OrderLine {
            id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity,
        })
    }

    /// Loads the lines of `headers` and attaches them in line order.
    async fn attach_lines(&self, mut headers: Vec<Order>) -> Result<Vec<Order>, OrderStoreError> {
        if headers.is_empty() {
            return Ok(headers);
        }
        let ids: Vec<Uuid> = headers.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity
            FROM order_details
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let line = Self::row_to_line(row)?;
            by_order.entry(line.order_id).or_default().push(line);
        }
        for order in &mut headers {
            order.lines = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(headers)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn commit(&self, order: &Order) -> Result<(), OrderStoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, member_email, order_status, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.member_email.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                OrderStoreError::Corrupt(format!("quantity {} out of range", line.quantity))
            })?;
            let line_no = i32::try_from(line_no)
                .map_err(|_| OrderStoreError::Corrupt("too many order lines".to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO order_details (id, order_id, line_no, product_id, product_name, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(line_no)
            .bind(line.product_id.as_i64())
            .bind(&line.product_name)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let row = sqlx::query(
            "SELECT id, member_email, order_status, created_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = Self::row_to_header(&row)?;
        Ok(self.attach_lines(vec![header]).await?.pop())
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, member_email, order_status, created_at
            FROM orders
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let headers = rows
            .iter()
            .map(Self::row_to_header)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_lines(headers).await
    }

    async fn list_by_requester(
        &self,
        requester: &MemberEmail,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, member_email, order_status, created_at
            FROM orders
            WHERE member_email = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(requester.as_str())
        .fetch_all(&self.pool)
        .await?;

        let headers = rows
            .iter()
            .map(Self::row_to_header)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_lines(headers).await
    }
}
