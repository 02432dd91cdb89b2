//! Canonical order projection used by the matcher

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use codhub_common::Result;

use super::staging_record::amount_column;

/// Columns selected whenever a `CanonicalOrder` is loaded
pub const ORDER_COLUMNS: &str = "id, operation_id, order_number, customer_name, customer_email, \
     customer_phone, total, status, order_date, tracking_number, carrier_matched_at";

/// The storefront-owned order a staging record is merged into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub id: i64,
    pub operation_id: i64,
    pub order_number: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub total: Option<f64>,
    pub status: String,
    pub order_date: String,
    pub tracking_number: Option<String>,
    pub carrier_matched_at: Option<String>,
}

impl CanonicalOrder {
    /// Build from a row selected with [`ORDER_COLUMNS`]
    ///
    /// A `total` that is not an amount reads as `None`, which only removes the
    /// order from name+value matching.
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            operation_id: row.try_get("operation_id")?,
            order_number: row.try_get("order_number")?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            total: amount_column(row, "total").unwrap_or(None),
            status: row.try_get("status")?,
            order_date: row.try_get("order_date")?,
            tracking_number: row.try_get("tracking_number")?,
            carrier_matched_at: row.try_get("carrier_matched_at")?,
        })
    }
}
