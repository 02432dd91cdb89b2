//! Per-tenant sync session aggregate
//!
//! One row per tenant in `sync_sessions`. During a run the orchestrator owns
//! the in-memory aggregate; every change goes through [`SyncSession::apply`]
//! or a phase transition, and [`SyncSession::recompute_percentage`] is the
//! only place the percentage is derived.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use codhub_common::events::SyncPhase;

use super::reconcile_result::{BatchStats, ProgressMessage, ReconcileSummary, StopReason};

/// Per-provider slice of a run's progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderProgress {
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed_matches: u64,
    pub retry_deferred: u64,
    pub errors: u64,
    pub batches: u32,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// Sync session snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    pub user_id: i64,
    pub is_running: bool,
    pub phase: SyncPhase,
    pub run_id: Option<Uuid>,
    /// Bumped on every persisted change
    pub version: i64,
    pub total_to_process: u64,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed_matches: u64,
    pub errors: u64,
    /// 0..=100; never 100 before completion
    pub percentage: u8,
    pub message: Option<String>,
    pub provider_progress: BTreeMap<String, ProviderProgress>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncSession {
    /// Snapshot for a tenant that has never synced
    pub fn idle(user_id: i64) -> Self {
        Self {
            user_id,
            is_running: false,
            phase: SyncPhase::Preparing,
            run_id: None,
            version: 0,
            total_to_process: 0,
            processed: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            failed_matches: 0,
            errors: 0,
            percentage: 0,
            message: None,
            provider_progress: BTreeMap::new(),
            start_time: None,
            end_time: None,
            updated_at: Utc::now(),
        }
    }

    /// Freshly acquired run, as written by the acquisition update
    pub fn acquired(user_id: i64, run_id: Uuid, version: i64, now: DateTime<Utc>) -> Self {
        Self {
            is_running: true,
            run_id: Some(run_id),
            version,
            start_time: Some(now),
            updated_at: now,
            ..Self::idle(user_id)
        }
    }

    /// Any counter carries data from a previous run
    pub fn has_counters(&self) -> bool {
        self.total_to_process > 0
            || self.processed > 0
            || self.created > 0
            || self.updated > 0
            || self.skipped > 0
            || self.failed_matches > 0
            || self.errors > 0
    }

    /// Finished run whose counters have outlived the grace window
    pub fn is_stale(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        if self.is_running || !self.has_counters() {
            return false;
        }
        match self.end_time {
            Some(end) => now - end > grace,
            None => false,
        }
    }

    /// Counting finished; reconcilers are about to start
    pub fn begin_syncing(&mut self, total_to_process: u64) {
        self.total_to_process = total_to_process;
        self.phase = SyncPhase::Syncing;
        self.recompute_percentage();
    }

    /// Fold a reconciler message into the aggregate
    pub fn apply(&mut self, message: &ProgressMessage) {
        match message {
            ProgressMessage::Batch { provider, stats } => self.apply_batch(provider, stats),
            ProgressMessage::Finished { provider, summary } => {
                self.apply_finished(provider, summary)
            }
        }
        self.recompute_percentage();
    }

    fn apply_batch(&mut self, provider: &str, stats: &BatchStats) {
        self.processed += stats.processed;
        self.updated += stats.updated;
        self.skipped += stats.skipped;
        self.failed_matches += stats.failed_matches;
        self.errors += stats.errors;

        let entry = self.provider_progress.entry(provider.to_string()).or_default();
        entry.processed += stats.processed;
        entry.updated += stats.updated;
        entry.skipped += stats.skipped;
        entry.failed_matches += stats.failed_matches;
        entry.retry_deferred += stats.retry_deferred;
        entry.errors += stats.errors;
        entry.batches += 1;
    }

    fn apply_finished(&mut self, provider: &str, summary: &ReconcileSummary) {
        let entry = self.provider_progress.entry(provider.to_string()).or_default();
        entry.done = true;
        entry.stop_reason = Some(summary.stop_reason);
    }

    /// Mark the run completed; the only transition that yields 100%
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.phase = SyncPhase::Completed;
        self.is_running = false;
        self.end_time = Some(now);
        self.message = None;
        self.recompute_percentage();
    }

    /// Mark the run failed with a human-readable reason
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.phase = SyncPhase::Error;
        self.is_running = false;
        self.end_time = Some(now);
        self.message = Some(message.into());
        self.recompute_percentage();
    }

    /// Zero counters and return to `preparing` (stale or administrative reset)
    pub fn clear_counters(&mut self) {
        self.phase = SyncPhase::Preparing;
        self.total_to_process = 0;
        self.processed = 0;
        self.created = 0;
        self.updated = 0;
        self.skipped = 0;
        self.failed_matches = 0;
        self.errors = 0;
        self.percentage = 0;
        self.message = None;
        self.provider_progress.clear();
    }

    /// `floor(processed * 100 / total)`, capped at 99 until completion
    pub fn recompute_percentage(&mut self) {
        self.percentage = match self.phase {
            SyncPhase::Completed => 100,
            _ if self.total_to_process == 0 => 0,
            _ => {
                let pct = self.processed.saturating_mul(100) / self.total_to_process;
                pct.min(99) as u8
            }
        };
    }
}
