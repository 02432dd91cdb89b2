//! Provider staging table access
//!
//! Table names come from provider adapters, never from user input.

use serde_json::json;
use sqlx::SqlitePool;
use codhub_common::Result;

use super::placeholders;
use crate::models::StagingRow;

const STAGING_COLUMNS: &str = "id, account_id, provider_order_id, order_number, status, \
     tracking_code, value, recipient, raw_payload";

/// Unprocessed rows belonging to the given accounts
pub async fn count_unprocessed(pool: &SqlitePool, table: &str, account_ids: &[i64]) -> Result<u64> {
    if account_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "SELECT COUNT(*) FROM {table} WHERE processed_to_orders = 0 AND account_id IN ({})",
        placeholders(account_ids.len())
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for id in account_ids {
        query = query.bind(id);
    }

    Ok(query.fetch_one(pool).await?.max(0) as u64)
}

/// Next batch of unprocessed rows with `id > after_id`, in id order
///
/// A row whose columns cannot be decoded is returned with its decode error
/// rather than failing the whole batch.
pub async fn fetch_batch(
    pool: &SqlitePool,
    table: &str,
    account_ids: &[i64],
    after_id: i64,
    limit: u32,
) -> Result<Vec<StagingRow>> {
    if account_ids.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {STAGING_COLUMNS} FROM {table}
         WHERE processed_to_orders = 0 AND id > ? AND account_id IN ({})
         ORDER BY id
         LIMIT ?",
        placeholders(account_ids.len())
    );
    let mut query = sqlx::query(&sql).bind(after_id);
    for id in account_ids {
        query = query.bind(id);
    }
    let rows = query.bind(limit as i64).fetch_all(pool).await?;

    rows.iter().map(StagingRow::from_row).collect()
}

/// Close a row as processed and stamp `raw_payload.<stamp_key> = {reason, at}`
///
/// Returns false when the row was already processed.
pub async fn close_with_stamp(
    pool: &SqlitePool,
    table: &str,
    id: i64,
    stamp_key: &str,
    reason: &str,
    at: &str,
) -> Result<bool> {
    let stamp = json!({ "reason": reason, "at": at }).to_string();
    let sql = format!(
        r#"
        UPDATE {table}
        SET processed_to_orders = 1,
            processed_at = ?,
            raw_payload = json_set(
                CASE WHEN json_valid(raw_payload) THEN raw_payload ELSE '{{}}' END,
                '$.' || ?,
                json(?)
            )
        WHERE id = ? AND processed_to_orders = 0
        "#
    );

    let result = sqlx::query(&sql)
        .bind(at)
        .bind(stamp_key)
        .bind(stamp)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
