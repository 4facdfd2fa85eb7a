// PostgreSQL订单存储
// 版本比较写入由 UPDATE ... WHERE version = $n 完成

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;
use crate::config::DatabaseConfig;
use crate::errors::{PaymentError, Result};
use crate::models::{Order, OrderStatus};
use crate::services::OrderStore;

const ORDER_COLUMNS: &str = "order_id, amount, currency, description, item_label, payer_email, \
     payer_phone, status, gateway_tracking_id, redirect_url, created_at, updated_at, version";

/// 订单表行
#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: Uuid,
    amount: Decimal,
    currency: String,
    description: String,
    item_label: Option<String>,
    payer_email: String,
    payer_phone: String,
    status: String,
    gateway_tracking_id: Option<String>,
    redirect_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = PaymentError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            order_id: row.order_id,
            amount: row.amount,
            currency: row.currency,
            description: row.description,
            item_label: row.item_label,
            payer_email: row.payer_email,
            payer_phone: row.payer_phone,
            status: row.status.parse()?,
            gateway_tracking_id: row.gateway_tracking_id,
            redirect_url: row.redirect_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// PostgreSQL订单存储
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// 使用已有连接池创建存储
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 连接数据库并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("Database migrations applied");

        Ok(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE {} = $1", ORDER_COLUMNS, column);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, amount, currency, description, item_label, payer_email,
                payer_phone, status, gateway_tracking_id, redirect_url,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.order_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.description)
        .bind(&order.item_label)
        .bind(&order.payer_email)
        .bind(&order.payer_phone)
        .bind(order.status.as_str())
        .bind(&order.gateway_tracking_id)
        .bind(&order.redirect_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Order>> {
        self.fetch_one_by("gateway_tracking_id", tracking_id).await
    }

    async fn compare_and_swap(&self, next: &Order, expected_version: i64) -> Result<()> {
        // 金额、币种、联系人等字段创建后不可变, 不参与更新
        let rows_affected = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                gateway_tracking_id = COALESCE(gateway_tracking_id, $4),
                redirect_url = COALESCE(redirect_url, $5),
                updated_at = $6,
                version = $7
            WHERE order_id = $1 AND version = $2
            "#,
        )
        .bind(next.order_id)
        .bind(expected_version)
        .bind(next.status.as_str())
        .bind(&next.gateway_tracking_id)
        .bind(&next.redirect_url)
        .bind(next.updated_at)
        .bind(next.version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let found: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
                .bind(next.order_id)
                .fetch_optional(&self.pool)
                .await?;

            return Err(match found {
                Some(version) => PaymentError::stale(
                    next.order_id,
                    format!("expected version {}, found {}", expected_version, version),
                ),
                None => PaymentError::UnknownOrder(next.order_id.to_string()),
            });
        }

        Ok(())
    }

    async fn overdue(&self, statuses: &[OrderStatus], cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM orders WHERE status = ANY($1) AND updated_at < $2 ORDER BY updated_at ASC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(statuses)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_rejects_unknown_status() {
        let now = Utc::now();
        let row = OrderRow {
            order_id: Uuid::new_v4(),
            amount: Decimal::new(4200000, 0),
            currency: "UGX".to_string(),
            description: "Grow".to_string(),
            item_label: None,
            payer_email: "payer@example.com".to_string(),
            payer_phone: "+256701234567".to_string(),
            status: "refunded".to_string(),
            gateway_tracking_id: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        assert!(Order::try_from(row).is_err());
    }

    #[test]
    fn test_row_conversion() {
        let now = Utc::now();
        let row = OrderRow {
            order_id: Uuid::new_v4(),
            amount: Decimal::new(4200000, 0),
            currency: "UGX".to_string(),
            description: "Grow".to_string(),
            item_label: Some("Hosting".to_string()),
            payer_email: "payer@example.com".to_string(),
            payer_phone: "+256701234567".to_string(),
            status: "awaiting_callback".to_string(),
            gateway_tracking_id: Some("TRK-1".to_string()),
            redirect_url: Some("https://pay/1".to_string()),
            created_at: now,
            updated_at: now,
            version: 2,
        };
        let order = Order::try_from(row).unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingCallback);
        assert_eq!(order.version, 2);
    }
}
