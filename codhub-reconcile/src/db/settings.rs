//! Settings database operations
//!
//! Key-value accessors over the shared `settings` table.

use sqlx::{Pool, Sqlite};
use codhub_common::{Error, Result};

/// Raw setting value; `None` when the key is missing or NULL
pub async fn get_setting_raw(db: &Pool<Sqlite>, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    Ok(value.flatten())
}

/// Typed setting value; parse failures are configuration errors
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_setting_raw(db, key).await? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e))),
        None => Ok(None),
    }
}

/// Insert or overwrite a setting
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Remove a setting so lower configuration tiers apply
pub async fn delete_setting(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(())
}
