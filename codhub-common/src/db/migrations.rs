//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//! `CREATE TABLE IF NOT EXISTS` in `init.rs` only covers fresh databases;
//! anything added to an existing table after release belongs here.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - every migration must be safe to run twice

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if no version has been recorded yet
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: lookup indexes for batch draining and order matching
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let staging_tables = crate::db::init::STAGING_TABLES_WITH_ORDER_LINK
        .iter()
        .chain(crate::db::init::STAGING_TABLES_WITHOUT_ORDER_LINK.iter());

    for table in staging_tables {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_pending ON {table} (processed_to_orders, account_id, id)"
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_operation_number ON orders (operation_id, order_number)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_operation_email ON orders (operation_id, customer_email)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_operation_total ON orders (operation_id, total)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration v2: per-provider progress column on sync_sessions
///
/// Databases created before per-provider progress reporting lack the column.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('sync_sessions') WHERE name = 'provider_progress'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query(
            "ALTER TABLE sync_sessions ADD COLUMN provider_progress TEXT NOT NULL DEFAULT '{}'",
        )
        .execute(pool)
        .await?;
        info!("Migration v2: Added provider_progress column to sync_sessions");
    }

    Ok(())
}
