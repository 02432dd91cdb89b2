//! Canonical order lookups and match merging
//!
//! Lookups are always scoped to one operation and, when the operation has an
//! integration start, to orders placed on or after it. Candidate lists come
//! back most recent first (`order_date` desc, then `id` desc).

use sqlx::{Row, SqlitePool};
use codhub_common::Result;

use super::placeholders;
use crate::models::canonical_order::ORDER_COLUMNS;
use crate::models::{CanonicalOrder, OrderStatus, RecipientContact};

/// Date scope filter; binds the integration date twice
const DATE_SCOPE: &str = "(? IS NULL OR julianday(order_date) >= julianday(?))";

/// Recency ordering shared by every candidate query
const RECENT_FIRST: &str = "ORDER BY julianday(order_date) DESC, id DESC";

/// Orders whose number equals any of `numbers`
pub async fn find_by_order_numbers(
    pool: &SqlitePool,
    operation_id: i64,
    numbers: &[String],
    since: Option<&str>,
) -> Result<Vec<CanonicalOrder>> {
    if numbers.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE operation_id = ? AND {DATE_SCOPE} AND order_number IN ({})
         {RECENT_FIRST}",
        placeholders(numbers.len())
    );
    let mut query = sqlx::query(&sql).bind(operation_id).bind(since).bind(since);
    for number in numbers {
        query = query.bind(number);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(CanonicalOrder::from_row).collect()
}

/// Most recent order whose stored email (column or `customer_data.email`) equals `email`
///
/// `email` must already be normalized.
pub async fn find_by_email(
    pool: &SqlitePool,
    operation_id: i64,
    email: &str,
    since: Option<&str>,
) -> Result<Option<CanonicalOrder>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE operation_id = ? AND {DATE_SCOPE}
           AND (
               lower(trim(customer_email)) = ?
               OR lower(trim(CASE WHEN json_valid(customer_data)
                                  THEN json_extract(customer_data, '$.email') END)) = ?
           )
         {RECENT_FIRST}
         LIMIT 1"
    );

    let row = sqlx::query(&sql)
        .bind(operation_id)
        .bind(since)
        .bind(since)
        .bind(email)
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(CanonicalOrder::from_row).transpose()
}

/// Stored phone fields of one order, in fallback order
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPhones {
    pub order_id: i64,
    /// `customer_phone`, `customer_data.phone`, `customer_data.shipping_address.phone`,
    /// `customer_data.billing_address.phone`
    pub phones: [Option<String>; 4],
}

/// Every in-scope order's phone fields, most recent first
pub async fn load_stored_phones(
    pool: &SqlitePool,
    operation_id: i64,
    since: Option<&str>,
) -> Result<Vec<StoredPhones>> {
    let sql = format!(
        "SELECT id,
                customer_phone,
                CASE WHEN json_valid(customer_data)
                     THEN CAST(json_extract(customer_data, '$.phone') AS TEXT) END AS data_phone,
                CASE WHEN json_valid(customer_data)
                     THEN CAST(json_extract(customer_data, '$.shipping_address.phone') AS TEXT) END AS shipping_phone,
                CASE WHEN json_valid(customer_data)
                     THEN CAST(json_extract(customer_data, '$.billing_address.phone') AS TEXT) END AS billing_phone
         FROM orders
         WHERE operation_id = ? AND {DATE_SCOPE}
         {RECENT_FIRST}"
    );

    let rows = sqlx::query(&sql)
        .bind(operation_id)
        .bind(since)
        .bind(since)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<StoredPhones> {
            Ok(StoredPhones {
                order_id: row.try_get("id")?,
                phones: [
                    row.try_get("customer_phone")?,
                    row.try_get("data_phone")?,
                    row.try_get("shipping_phone")?,
                    row.try_get("billing_phone")?,
                ],
            })
        })
        .collect()
}

/// Orders whose total lies within `tolerance` of `value`
pub async fn find_by_total_window(
    pool: &SqlitePool,
    operation_id: i64,
    value: f64,
    tolerance: f64,
    since: Option<&str>,
) -> Result<Vec<CanonicalOrder>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE operation_id = ? AND {DATE_SCOPE}
           AND total IS NOT NULL AND ABS(total - ?) <= ?
         {RECENT_FIRST}"
    );

    let rows = sqlx::query(&sql)
        .bind(operation_id)
        .bind(since)
        .bind(since)
        .bind(value)
        .bind(tolerance)
        .fetch_all(pool)
        .await?;

    rows.iter().map(CanonicalOrder::from_row).collect()
}

/// Load one order by id
pub async fn get_order(pool: &SqlitePool, order_id: i64) -> Result<Option<CanonicalOrder>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    let row = sqlx::query(&sql).bind(order_id).fetch_optional(pool).await?;
    row.as_ref().map(CanonicalOrder::from_row).transpose()
}

/// Everything written when a staging row is merged into a canonical order
#[derive(Debug, Clone)]
pub struct MatchMerge<'a> {
    pub order_id: i64,
    pub provider_key: &'a str,
    pub staging_table: &'a str,
    pub staging_id: i64,
    /// Staging table has a `matched_order_id` column
    pub link_order: bool,
    /// `None` leaves the canonical status untouched
    pub mapped_status: Option<OrderStatus>,
    pub tracking_number: Option<&'a str>,
    pub carrier_order_id: Option<&'a str>,
    /// Becomes `provider_data.<provider_key>`
    pub provider_data: serde_json::Value,
    /// Fills storefront contact fields that are still empty
    pub contact: &'a RecipientContact,
    /// Fills `total` when still empty
    pub value: Option<f64>,
    pub synced_at: &'a str,
}

/// Merge a staging row into its canonical order and close the row, atomically
///
/// Returns false (and writes nothing) when the staging row was already processed.
pub async fn apply_match(pool: &SqlitePool, merge: &MatchMerge<'_>) -> Result<bool> {
    let provider_data = merge.provider_data.to_string();
    let mut tx = pool.begin().await?;

    let close_sql = if merge.link_order {
        format!(
            "UPDATE {} SET processed_to_orders = 1, processed_at = ?, matched_order_id = ?
             WHERE id = ? AND processed_to_orders = 0",
            merge.staging_table
        )
    } else {
        format!(
            "UPDATE {} SET processed_to_orders = 1, processed_at = ?
             WHERE id = ? AND processed_to_orders = 0",
            merge.staging_table
        )
    };

    let mut close = sqlx::query(&close_sql).bind(merge.synced_at);
    if merge.link_order {
        close = close.bind(merge.order_id);
    }
    let closed = close.bind(merge.staging_id).execute(&mut *tx).await?;

    if closed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE orders
        SET status = COALESCE(?, status),
            tracking_number = COALESCE(?, tracking_number),
            carrier_order_id = COALESCE(?, carrier_order_id),
            carrier_matched_at = COALESCE(carrier_matched_at, ?),
            provider_data = json_set(
                CASE WHEN json_valid(provider_data) THEN provider_data ELSE '{}' END,
                '$.' || ?,
                json(?)
            ),
            customer_email = CASE WHEN customer_email IS NULL OR trim(customer_email) = ''
                                  THEN ? ELSE customer_email END,
            customer_phone = CASE WHEN customer_phone IS NULL OR trim(customer_phone) = ''
                                  THEN ? ELSE customer_phone END,
            customer_name = CASE WHEN customer_name IS NULL OR trim(customer_name) = ''
                                 THEN ? ELSE customer_name END,
            total = COALESCE(total, ?),
            carrier_imported = 1,
            last_synced_at = ?,
            needs_sync = 0
        WHERE id = ?
        "#,
    )
    .bind(merge.mapped_status.map(|s| s.as_str()))
    .bind(merge.tracking_number)
    .bind(merge.carrier_order_id)
    .bind(merge.synced_at)
    .bind(merge.provider_key)
    .bind(provider_data)
    .bind(merge.contact.email.as_deref())
    .bind(merge.contact.phone.as_deref())
    .bind(merge.contact.name.as_deref())
    .bind(merge.value)
    .bind(merge.synced_at)
    .bind(merge.order_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}
