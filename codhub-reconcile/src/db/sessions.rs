//! Sync session database operations
//!
//! One `sync_sessions` row per tenant. Acquisition is a single conditional
//! UPDATE, and every progress write is guarded by `run_id` so a superseded
//! run can no longer touch the row.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use codhub_common::events::SyncPhase;
use codhub_common::time::{parse_timestamp, to_rfc3339};
use codhub_common::Result;

use crate::models::SyncSession;

const SESSION_COLUMNS: &str = "user_id, is_running, phase, run_id, version, total_to_process, \
     processed, created, updated, skipped, failed_matches, errors, percentage, message, \
     provider_progress, start_time, end_time, updated_at";

fn session_from_row(row: &SqliteRow) -> Result<SyncSession> {
    let phase: String = row.try_get("phase")?;
    let run_id: Option<String> = row.try_get("run_id")?;
    let provider_progress: Option<String> = row.try_get("provider_progress")?;
    let start_time: Option<String> = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    let updated_at: String = row.try_get("updated_at")?;
    let count = |name: &str| -> Result<u64> { Ok(row.try_get::<i64, _>(name)?.max(0) as u64) };

    Ok(SyncSession {
        user_id: row.try_get("user_id")?,
        is_running: row.try_get::<i64, _>("is_running")? != 0,
        phase: SyncPhase::parse(&phase),
        run_id: run_id.and_then(|s| Uuid::parse_str(&s).ok()),
        version: row.try_get("version")?,
        total_to_process: count("total_to_process")?,
        processed: count("processed")?,
        created: count("created")?,
        updated: count("updated")?,
        skipped: count("skipped")?,
        failed_matches: count("failed_matches")?,
        errors: count("errors")?,
        percentage: row.try_get::<i64, _>("percentage")?.clamp(0, 100) as u8,
        message: row.try_get("message")?,
        provider_progress: provider_progress
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        start_time: start_time.as_deref().and_then(parse_timestamp),
        end_time: end_time.as_deref().and_then(parse_timestamp),
        updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
    })
}

/// Load a tenant's session row
pub async fn load_session(pool: &SqlitePool, user_id: i64) -> Result<Option<SyncSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sync_sessions WHERE user_id = ?");
    let row = sqlx::query(&sql).bind(user_id).fetch_optional(pool).await?;
    row.as_ref().map(session_from_row).transpose()
}

/// Try to start a run for a tenant
///
/// Succeeds when no run is active, when `continuation` equals the active
/// run's id, or when the active run has not been updated since `stale_before`.
/// On success the row is reset for `run_id` and the new version is returned;
/// `None` means the tenant is busy.
pub async fn try_acquire(
    pool: &SqlitePool,
    user_id: i64,
    continuation: Option<Uuid>,
    run_id: Uuid,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<Option<i64>> {
    let now = to_rfc3339(&now);

    sqlx::query("INSERT OR IGNORE INTO sync_sessions (user_id, updated_at) VALUES (?, ?)")
        .bind(user_id)
        .bind(&now)
        .execute(pool)
        .await?;

    let version: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE sync_sessions
        SET is_running = 1,
            phase = 'preparing',
            run_id = ?,
            version = version + 1,
            total_to_process = 0,
            processed = 0,
            created = 0,
            updated = 0,
            skipped = 0,
            failed_matches = 0,
            errors = 0,
            percentage = 0,
            message = NULL,
            provider_progress = '{}',
            start_time = ?,
            end_time = NULL,
            updated_at = ?
        WHERE user_id = ?
          AND (
              is_running = 0
              OR (? IS NOT NULL AND run_id = ?)
              OR julianday(updated_at) < julianday(?)
          )
        RETURNING version
        "#,
    )
    .bind(run_id.to_string())
    .bind(&now)
    .bind(&now)
    .bind(user_id)
    .bind(continuation.map(|c| c.to_string()))
    .bind(continuation.map(|c| c.to_string()))
    .bind(to_rfc3339(&stale_before))
    .fetch_optional(pool)
    .await?;

    Ok(version)
}

/// Persist the aggregate for its run
///
/// Returns the new version, or `None` when the row now belongs to another run.
pub async fn save_progress(pool: &SqlitePool, session: &SyncSession) -> Result<Option<i64>> {
    let Some(run_id) = session.run_id else {
        return Ok(None);
    };
    let provider_progress = serde_json::to_string(&session.provider_progress)?;

    let version: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE sync_sessions
        SET is_running = ?,
            phase = ?,
            version = version + 1,
            total_to_process = ?,
            processed = ?,
            created = ?,
            updated = ?,
            skipped = ?,
            failed_matches = ?,
            errors = ?,
            percentage = ?,
            message = ?,
            provider_progress = ?,
            start_time = ?,
            end_time = ?,
            updated_at = ?
        WHERE user_id = ? AND run_id = ?
        RETURNING version
        "#,
    )
    .bind(session.is_running as i64)
    .bind(session.phase.as_str())
    .bind(session.total_to_process as i64)
    .bind(session.processed as i64)
    .bind(session.created as i64)
    .bind(session.updated as i64)
    .bind(session.skipped as i64)
    .bind(session.failed_matches as i64)
    .bind(session.errors as i64)
    .bind(session.percentage as i64)
    .bind(&session.message)
    .bind(provider_progress)
    .bind(session.start_time.as_ref().map(to_rfc3339))
    .bind(session.end_time.as_ref().map(to_rfc3339))
    .bind(to_rfc3339(&Utc::now()))
    .bind(session.user_id)
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(version)
}

/// Zero counters of a finished session, provided it is still at `expected_version`
///
/// Returns the new version, or `None` if the row changed underneath.
pub async fn clear_finished_counters(
    pool: &SqlitePool,
    user_id: i64,
    expected_version: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE sync_sessions
        SET phase = 'preparing',
            version = version + 1,
            total_to_process = 0,
            processed = 0,
            created = 0,
            updated = 0,
            skipped = 0,
            failed_matches = 0,
            errors = 0,
            percentage = 0,
            message = NULL,
            provider_progress = '{}',
            updated_at = ?
        WHERE user_id = ? AND is_running = 0 AND version = ?
        RETURNING version
        "#,
    )
    .bind(to_rfc3339(&now))
    .bind(user_id)
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    Ok(version)
}

/// Administrative reset: clear the running flag, run id, counters and message
///
/// Creates the row when the tenant never synced. Returns the new version.
pub async fn reset_session(pool: &SqlitePool, user_id: i64, now: DateTime<Utc>) -> Result<i64> {
    let now = to_rfc3339(&now);

    sqlx::query("INSERT OR IGNORE INTO sync_sessions (user_id, updated_at) VALUES (?, ?)")
        .bind(user_id)
        .bind(&now)
        .execute(pool)
        .await?;

    let version: i64 = sqlx::query_scalar(
        r#"
        UPDATE sync_sessions
        SET is_running = 0,
            phase = 'preparing',
            run_id = NULL,
            version = version + 1,
            total_to_process = 0,
            processed = 0,
            created = 0,
            updated = 0,
            skipped = 0,
            failed_matches = 0,
            errors = 0,
            percentage = 0,
            message = NULL,
            provider_progress = '{}',
            updated_at = ?
        WHERE user_id = ?
        RETURNING version
        "#,
    )
    .bind(&now)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(version)
}

/// Mark every session left running by a previous process as failed
///
/// Returns the number of sessions cleaned up.
pub async fn mark_interrupted(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let now = to_rfc3339(&now);
    let result = sqlx::query(
        r#"
        UPDATE sync_sessions
        SET is_running = 0,
            phase = 'error',
            message = 'interrupted by restart',
            version = version + 1,
            end_time = ?,
            updated_at = ?
        WHERE is_running = 1
        "#,
    )
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
