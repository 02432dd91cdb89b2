//! Database fixtures
//!
//! Every test gets its own file-backed database created through the same
//! `init_database` path the service uses.

use anyhow::Result;
use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use codhub_common::db::init::{init_database, STAGING_TABLES_WITH_ORDER_LINK};
use codhub_reconcile::config::SyncLimits;

/// Create a temporary database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("codhub_test.db");
    let pool = init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Limits small enough to exercise batching in tests
pub fn test_limits() -> SyncLimits {
    SyncLimits {
        batch_size: 2,
        max_lock_wait_ms: 500,
        ..SyncLimits::default()
    }
}

pub async fn insert_user(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO users (id, email) VALUES (?, ?)")
        .bind(user_id)
        .bind(format!("tenant{}@example.com", user_id))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_operation(
    pool: &SqlitePool,
    user_id: i64,
    name: &str,
    order_prefix: Option<&str>,
    integration_started_at: Option<&str>,
) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO operations (user_id, name, order_prefix, integration_started_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(name)
    .bind(order_prefix)
    .bind(integration_started_at)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn insert_account(pool: &SqlitePool, user_id: i64, provider: &str, status: &str) -> Result<i64> {
    let id = sqlx::query("INSERT INTO warehouse_accounts (user_id, provider, status) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(provider)
        .bind(status)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn link_account(pool: &SqlitePool, operation_id: i64, account_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO operation_warehouse_accounts (operation_id, account_id) VALUES (?, ?)")
        .bind(operation_id)
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Canonical order fixture; unset fields stay NULL
#[derive(Debug, Clone)]
pub struct OrderFixture {
    pub order_number: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_data: Option<Value>,
    pub total: Option<f64>,
    pub status: String,
    pub order_date: String,
}

impl OrderFixture {
    pub fn new(order_number: &str) -> Self {
        Self {
            order_number: order_number.to_string(),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            customer_data: None,
            total: None,
            status: "pending".to_string(),
            order_date: "2026-03-01T10:00:00Z".to_string(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.customer_name = Some(name.to_string());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.customer_email = Some(email.to_string());
        self
    }

    pub fn phone(mut self, phone: &str) -> Self {
        self.customer_phone = Some(phone.to_string());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.customer_data = Some(data);
        self
    }

    pub fn total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn date(mut self, order_date: &str) -> Self {
        self.order_date = order_date.to_string();
        self
    }
}

pub async fn insert_order(pool: &SqlitePool, operation_id: i64, order: &OrderFixture) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO orders (operation_id, order_number, customer_name, customer_email,
                            customer_phone, customer_data, total, status, order_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(operation_id)
    .bind(&order.order_number)
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .bind(order.customer_data.as_ref().map(|d| d.to_string()))
    .bind(order.total)
    .bind(&order.status)
    .bind(&order.order_date)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Provider staging row fixture
#[derive(Debug, Clone, Default)]
pub struct StagingFixture {
    pub provider_order_id: Option<String>,
    pub order_number: Option<String>,
    pub status: Option<String>,
    pub tracking_code: Option<String>,
    pub value: Option<f64>,
    pub recipient: Option<Value>,
    pub raw_payload: Option<Value>,
}

impl StagingFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_number(mut self, number: &str) -> Self {
        self.order_number = Some(number.to_string());
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn tracking(mut self, code: &str) -> Self {
        self.tracking_code = Some(code.to_string());
        self
    }

    pub fn provider_order_id(mut self, id: &str) -> Self {
        self.provider_order_id = Some(id.to_string());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn recipient(mut self, name: Option<&str>, email: Option<&str>, phone: Option<&str>) -> Self {
        self.recipient = Some(json!({ "name": name, "email": email, "phone": phone }));
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.raw_payload = Some(payload);
        self
    }
}

pub async fn insert_staging(
    pool: &SqlitePool,
    table: &str,
    account_id: i64,
    row: &StagingFixture,
) -> Result<i64> {
    let sql = format!(
        "INSERT INTO {table} (account_id, provider_order_id, order_number, status, tracking_code,
                              value, recipient, raw_payload)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    );
    let id = sqlx::query(&sql)
        .bind(account_id)
        .bind(&row.provider_order_id)
        .bind(&row.order_number)
        .bind(&row.status)
        .bind(&row.tracking_code)
        .bind(row.value)
        .bind(row.recipient.as_ref().map(|r| r.to_string()))
        .bind(row.raw_payload.clone().unwrap_or_else(|| json!({})).to_string())
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

/// Processing state of one staging row
#[derive(Debug, Clone)]
pub struct StagingState {
    pub processed: bool,
    pub processed_at: Option<String>,
    pub raw_payload: Value,
    /// Always `None` for tables without the link column
    pub matched_order_id: Option<i64>,
}

pub async fn staging_state(pool: &SqlitePool, table: &str, id: i64) -> Result<StagingState> {
    let has_link = STAGING_TABLES_WITH_ORDER_LINK.contains(&table);
    let link = if has_link { "matched_order_id" } else { "NULL AS matched_order_id" };
    let sql = format!(
        "SELECT processed_to_orders, processed_at, raw_payload, {link} FROM {table} WHERE id = ?"
    );
    let row = sqlx::query(&sql).bind(id).fetch_one(pool).await?;
    let raw: String = row.get("raw_payload");

    Ok(StagingState {
        processed: row.get::<i64, _>("processed_to_orders") == 1,
        processed_at: row.get("processed_at"),
        raw_payload: serde_json::from_str(&raw)?,
        matched_order_id: row.get("matched_order_id"),
    })
}

/// Parsed `orders.provider_data` (empty object when NULL)
pub async fn order_provider_data(pool: &SqlitePool, order_id: i64) -> Result<Value> {
    let raw: Option<String> = sqlx::query_scalar("SELECT provider_data FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_one(pool)
        .await?;
    Ok(match raw {
        Some(raw) => serde_json::from_str(&raw)?,
        None => json!({}),
    })
}

/// Total canonical orders for an operation
pub async fn count_orders(pool: &SqlitePool, operation_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE operation_id = ?")
        .bind(operation_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Whether the tenant's session row is marked running
pub async fn has_running_session(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let running: Option<i64> =
        sqlx::query_scalar("SELECT is_running FROM sync_sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(running.unwrap_or(0) != 0)
}
