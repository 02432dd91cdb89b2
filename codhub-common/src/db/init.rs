//! Database initialization
//!
//! Opens (or creates) the shared SQLite database and makes sure every table
//! the reconciliation engine touches exists. Table creation is idempotent;
//! column additions for older databases live in `migrations.rs`.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Staging tables that carry a `matched_order_id` link column
pub const STAGING_TABLES_WITH_ORDER_LINK: &[&str] =
    &["staging_atlas", "staging_boreal", "staging_delta"];

/// Staging tables without an order link column
pub const STAGING_TABLES_WITHOUT_ORDER_LINK: &[&str] = &["staging_cobalt", "staging_ember"];

/// Default SQLite busy timeout; lock contention beyond this is handled by retry logic
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = open_pool(db_path).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Open a connection pool with WAL, foreign keys and busy timeout applied to every connection
async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    let db_url = format!("sqlite://{}", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));

    // Provider reconcilers run concurrently, each holding at most one connection
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_operations_table(pool).await?;
    create_warehouse_accounts_table(pool).await?;
    create_operation_accounts_table(pool).await?;
    create_orders_table(pool).await?;

    for table in STAGING_TABLES_WITH_ORDER_LINK {
        create_staging_table(pool, table, true).await?;
    }
    for table in STAGING_TABLES_WITHOUT_ORDER_LINK {
        create_staging_table(pool, table, false).await?;
    }

    create_sync_sessions_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_operations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operations (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,
            order_prefix TEXT,
            integration_started_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_warehouse_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS warehouse_accounts (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            provider TEXT NOT NULL,
            display_name TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'active')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_operation_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operation_warehouse_accounts (
            operation_id INTEGER NOT NULL REFERENCES operations(id) ON DELETE CASCADE,
            account_id INTEGER NOT NULL REFERENCES warehouse_accounts(id) ON DELETE CASCADE,
            PRIMARY KEY (operation_id, account_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_orders_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY,
            operation_id INTEGER NOT NULL REFERENCES operations(id),
            order_number TEXT NOT NULL,
            customer_name TEXT,
            customer_email TEXT,
            customer_phone TEXT,
            customer_data TEXT,
            total REAL,
            status TEXT NOT NULL DEFAULT 'pending',
            order_date TEXT NOT NULL,
            tracking_number TEXT,
            carrier_imported INTEGER NOT NULL DEFAULT 0,
            carrier_order_id TEXT,
            carrier_matched_at TEXT,
            provider_data TEXT,
            last_synced_at TEXT,
            needs_sync INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create one provider staging table
///
/// All staging tables share the same shape; only some carry a direct link
/// to the matched canonical order.
async fn create_staging_table(pool: &SqlitePool, table: &str, with_order_link: bool) -> Result<()> {
    let link_column = if with_order_link {
        "matched_order_id INTEGER REFERENCES orders(id),"
    } else {
        ""
    };

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL REFERENCES warehouse_accounts(id),
            provider_order_id TEXT,
            order_number TEXT,
            status TEXT,
            tracking_code TEXT,
            value REAL,
            recipient TEXT,
            raw_payload TEXT NOT NULL DEFAULT '{{}}',
            processed_to_orders INTEGER NOT NULL DEFAULT 0,
            processed_at TEXT,
            {link_column}
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#
    );

    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

async fn create_sync_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_sessions (
            user_id INTEGER PRIMARY KEY,
            is_running INTEGER NOT NULL DEFAULT 0,
            phase TEXT NOT NULL DEFAULT 'preparing',
            run_id TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            total_to_process INTEGER NOT NULL DEFAULT 0,
            processed INTEGER NOT NULL DEFAULT 0,
            created INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            failed_matches INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            percentage INTEGER NOT NULL DEFAULT 0,
            message TEXT,
            provider_progress TEXT NOT NULL DEFAULT '{}',
            start_time TEXT,
            end_time TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures every sync tunable exists. NULL values are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "sync_batch_size", "100").await?;
    ensure_setting(pool, "sync_max_iterations", "500").await?;
    ensure_setting(pool, "sync_max_records", "50000").await?;
    ensure_setting(pool, "sync_max_run_seconds", "900").await?;
    ensure_setting(pool, "sync_max_lock_wait_ms", "5000").await?;
    ensure_setting(pool, "sync_stale_lock_minutes", "30").await?;
    ensure_setting(pool, "sync_progress_grace_seconds", "5").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing settings are created; NULL values are reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
