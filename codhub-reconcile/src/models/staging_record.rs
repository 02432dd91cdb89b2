//! Provider staging records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use codhub_common::{Error, Result};

/// One unprocessed row from a provider staging table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: i64,
    pub account_id: i64,
    pub provider_order_id: Option<String>,
    pub order_number: Option<String>,
    pub status: Option<String>,
    pub tracking_code: Option<String>,
    pub value: Option<f64>,
    /// Primary recipient block (`{name, email, phone}`), if the provider sent one
    pub recipient: Option<Value>,
    /// Opaque provider payload
    pub raw_payload: Value,
}

impl StagingRecord {
    /// Build from a staging table row
    ///
    /// Unparseable JSON columns degrade to `None` / an empty object. A column
    /// that cannot be decoded at all (e.g. `value` holding `"n/a"`) is an error.
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let recipient: Option<String> = row.try_get("recipient")?;
        let raw_payload: Option<String> = row.try_get("raw_payload")?;

        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            provider_order_id: row.try_get("provider_order_id")?,
            order_number: row.try_get("order_number")?,
            status: row.try_get("status")?,
            tracking_code: row.try_get("tracking_code")?,
            value: amount_column(row, "value")?,
            recipient: recipient.and_then(|s| serde_json::from_str(&s).ok()),
            raw_payload: raw_payload
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| Value::Object(Default::default())),
        })
    }
}

/// A fetched staging row; `record` holds the decode error for a malformed row
#[derive(Debug)]
pub struct StagingRow {
    pub id: i64,
    pub record: Result<StagingRecord>,
}

impl StagingRow {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            record: StagingRecord::from_row(row),
        })
    }
}

/// Read a money column that ingestion may have stored as REAL, INTEGER or text
///
/// Text is parsed with [`parse_amount`]; text that is not an amount is an error.
pub fn amount_column(row: &SqliteRow, column: &str) -> Result<Option<f64>> {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return Ok(value.map(|v| v as f64));
    }

    match row.try_get::<Option<String>, _>(column)? {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_amount(&text).map(Some).ok_or_else(|| {
            Error::InvalidInput(format!("column {} holds {:?}, not an amount", column, text))
        }),
    }
}

/// Parse a formatted amount: `49.90`, `R$ 49,90`, `1.234,56`, `1,234.56`
///
/// The last of `,` / `.` is the decimal separator when both appear; a lone
/// comma is decimal. Returns `None` when no digits are present.
pub fn parse_amount(text: &str) -> Option<f64> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (kept.rfind(','), kept.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (Some(_), None) if kept.matches(',').count() == 1 => kept.replace(',', "."),
        (Some(_), None) => kept.replace(',', ""),
        _ => kept,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Recipient contact fields pulled out of a staging record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl RecipientContact {
    /// Fill any missing field from `other`
    pub fn or(self, other: RecipientContact) -> RecipientContact {
        RecipientContact {
            name: self.name.or(other.name),
            email: self.email.or(other.email),
            phone: self.phone.or(other.phone),
        }
    }
}

/// Non-empty string at a JSON pointer; numbers are rendered as text
pub fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
