//! Progress store
//!
//! Durable per-tenant sync session access. Reads reset counters of a
//! finished run once they have outlived the grace window, so a dashboard
//! opening long after a run does not show its stale totals.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use codhub_common::Result;

use crate::db::sessions;
use crate::models::SyncSession;
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct ProgressStore {
    db: SqlitePool,
    grace: Duration,
    max_lock_wait_ms: u64,
}

impl ProgressStore {
    pub fn new(db: SqlitePool, grace: Duration, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            grace,
            max_lock_wait_ms,
        }
    }

    /// Current snapshot for a tenant
    ///
    /// A tenant that never synced gets an idle snapshot (nothing is written).
    pub async fn get(&self, user_id: i64) -> Result<SyncSession> {
        let Some(mut session) = sessions::load_session(&self.db, user_id).await? else {
            return Ok(SyncSession::idle(user_id));
        };

        let now = Utc::now();
        if !session.is_stale(now, self.grace) {
            return Ok(session);
        }

        let expected = session.version;
        let cleared = retry_on_lock("clear stale progress", self.max_lock_wait_ms, || {
            sessions::clear_finished_counters(&self.db, user_id, expected, now)
        })
        .await?;

        match cleared {
            Some(version) => {
                debug!(user_id, version, "Stale sync counters reset");
                session.clear_counters();
                session.version = version;
                session.updated_at = now;
                Ok(session)
            }
            // Row changed between read and reset; report what is there now
            None => Ok(sessions::load_session(&self.db, user_id)
                .await?
                .unwrap_or_else(|| SyncSession::idle(user_id))),
        }
    }

    /// Persist a run's aggregate; the stored version is copied back on success
    ///
    /// Returns false when the row now belongs to a different run.
    pub async fn save(&self, session: &mut SyncSession) -> Result<bool> {
        let snapshot = session.clone();
        let version = retry_on_lock("save sync progress", self.max_lock_wait_ms, || {
            sessions::save_progress(&self.db, &snapshot)
        })
        .await?;

        match version {
            Some(version) => {
                session.version = version;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Administrative reset of a tenant's session
    pub async fn reset(&self, user_id: i64) -> Result<SyncSession> {
        let now = Utc::now();
        let version = retry_on_lock("reset sync progress", self.max_lock_wait_ms, || {
            sessions::reset_session(&self.db, user_id, now)
        })
        .await?;
        info!(user_id, version, "Sync progress reset");

        Ok(sessions::load_session(&self.db, user_id)
            .await?
            .unwrap_or_else(|| SyncSession::idle(user_id)))
    }

    /// Fail every session a previous process left running
    pub async fn cleanup_interrupted(&self) -> Result<u64> {
        let count = sessions::mark_interrupted(&self.db, Utc::now()).await?;
        if count > 0 {
            warn!(sessions = count, "Marked interrupted sync sessions as failed");
        }
        Ok(count)
    }
}
