//! Configuration resolution for codhub-reconcile
//!
//! Sync limits resolve per field with Database → ENV → TOML → default
//! priority. Invalid values at any tier are logged and skipped.

use codhub_common::config::TomlConfig;
use codhub_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Safety limits and timing knobs for reconciliation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLimits {
    /// Staging rows fetched per batch
    pub batch_size: u32,
    /// Batches per provider per run
    pub max_iterations: u32,
    /// Rows examined per provider per run
    pub max_records: u32,
    /// Wall-clock budget per provider per run
    pub max_run_seconds: u64,
    /// Total backoff budget for one locked write
    pub max_lock_wait_ms: u64,
    /// A running session not updated for this long may be taken over
    pub stale_lock_minutes: u64,
    /// Finished-run counters survive this long before a read resets them
    pub progress_grace_seconds: u64,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_iterations: 500,
            max_records: 50_000,
            max_run_seconds: 900,
            max_lock_wait_ms: 5000,
            stale_lock_minutes: 30,
            progress_grace_seconds: 5,
        }
    }
}

impl SyncLimits {
    pub fn max_run(&self) -> Duration {
        Duration::from_secs(self.max_run_seconds)
    }

    pub fn stale_lock(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_lock_minutes as i64)
    }

    pub fn progress_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.progress_grace_seconds as i64)
    }

    /// Resolve every limit from the configuration tiers
    pub async fn resolve(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = SyncLimits::default();
        let toml = &toml_config.sync;

        Ok(SyncLimits {
            batch_size: resolve_limit(db, "batch_size", toml.batch_size, defaults.batch_size).await?,
            max_iterations: resolve_limit(db, "max_iterations", toml.max_iterations, defaults.max_iterations).await?,
            max_records: resolve_limit(db, "max_records", toml.max_records, defaults.max_records).await?,
            max_run_seconds: resolve_limit(db, "max_run_seconds", toml.max_run_seconds, defaults.max_run_seconds).await?,
            max_lock_wait_ms: resolve_limit(db, "max_lock_wait_ms", toml.max_lock_wait_ms, defaults.max_lock_wait_ms).await?,
            stale_lock_minutes: resolve_limit(db, "stale_lock_minutes", toml.stale_lock_minutes, defaults.stale_lock_minutes).await?,
            progress_grace_seconds: resolve_limit(db, "progress_grace_seconds", toml.progress_grace_seconds, defaults.progress_grace_seconds).await?,
        })
    }
}

/// Settings key for a limit (`sync_<name>`)
pub fn setting_key(name: &str) -> String {
    format!("sync_{}", name)
}

/// Environment variable for a limit (`CODHUB_SYNC_<NAME>`)
pub fn env_var_name(name: &str) -> String {
    format!("CODHUB_SYNC_{}", name.to_uppercase())
}

/// Resolve one limit: Database → ENV → TOML → default
///
/// Zero is never a valid limit and is treated like an unparseable value.
async fn resolve_limit<T>(
    db: &Pool<Sqlite>,
    name: &str,
    toml_value: Option<T>,
    default: T,
) -> Result<T>
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let key = setting_key(name);
    if let Some(raw) = crate::db::settings::get_setting_raw(db, &key).await? {
        match parse_positive::<T>(&raw) {
            Some(value) => {
                debug!(limit = name, %value, "Sync limit loaded from database");
                return Ok(value);
            }
            None => warn!(limit = name, value = %raw, "Ignoring invalid sync limit in database settings"),
        }
    }

    let env_name = env_var_name(name);
    if let Ok(raw) = std::env::var(&env_name) {
        match parse_positive::<T>(&raw) {
            Some(value) => {
                debug!(limit = name, %value, "Sync limit loaded from environment variable");
                return Ok(value);
            }
            None => warn!(limit = name, variable = %env_name, value = %raw, "Ignoring invalid sync limit in environment"),
        }
    }

    if let Some(value) = toml_value {
        if value > T::default() {
            debug!(limit = name, %value, "Sync limit loaded from TOML config");
            return Ok(value);
        }
        warn!(limit = name, %value, "Ignoring invalid sync limit in TOML config");
    }

    Ok(default)
}

fn parse_positive<T>(raw: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    raw.trim().parse::<T>().ok().filter(|v| *v > T::default())
}
