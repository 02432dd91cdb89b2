//! Reconciliation outcomes, per-provider summaries and run summaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use codhub_common::events::SyncPhase;

/// Which cascade step produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    OrderNumber,
    Email,
    PhoneExact,
    PhoneSuffix,
    PhoneReverseSuffix,
    NameValue,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::OrderNumber => "order_number",
            MatchStrategy::Email => "email",
            MatchStrategy::PhoneExact => "phone_exact",
            MatchStrategy::PhoneSuffix => "phone_suffix",
            MatchStrategy::PhoneReverseSuffix => "phone_reverse_suffix",
            MatchStrategy::NameValue => "name_value",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a provider reconciler stopped looping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A batch came back empty
    Drained,
    IterationCap,
    RecordCap,
    TimeCap,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Drained => "drained",
            StopReason::IterationCap => "iteration_cap",
            StopReason::RecordCap => "record_cap",
            StopReason::TimeCap => "time_cap",
        }
    }
}

/// Result of examining one staging record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Merged into a canonical order
    Matched { order_id: i64, strategy: MatchStrategy },
    /// No operation could be resolved; row closed as skipped
    OperationUnresolved,
    /// No match, terminal provider; row closed with a failed-match stamp
    FailedMatch,
    /// No match, retry provider; row left unprocessed
    RetryDeferred,
    /// Row was closed by another writer between fetch and merge
    AlreadyProcessed,
    /// Per-row failure; row left unprocessed
    Error(String),
}

/// Counters for one batch
///
/// `skipped` covers every examined row that was neither merged nor errored;
/// `failed_matches` and `retry_deferred` break part of it down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed_matches: u64,
    pub retry_deferred: u64,
    pub errors: u64,
}

impl BatchStats {
    /// Count one record outcome
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Matched { .. } => self.updated += 1,
            RecordOutcome::OperationUnresolved | RecordOutcome::AlreadyProcessed => {
                self.skipped += 1
            }
            RecordOutcome::FailedMatch => {
                self.skipped += 1;
                self.failed_matches += 1;
            }
            RecordOutcome::RetryDeferred => {
                self.skipped += 1;
                self.retry_deferred += 1;
            }
            RecordOutcome::Error(_) => self.errors += 1,
        }
    }
}

/// What one provider reconciler did during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub provider: String,
    pub processed: u64,
    /// Canonical orders created; always 0, staging never creates orders
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed_matches: u64,
    pub retry_deferred: u64,
    pub errors: u64,
    pub batches: u32,
    pub stop_reason: StopReason,
}

impl ReconcileSummary {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            processed: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            failed_matches: 0,
            retry_deferred: 0,
            errors: 0,
            batches: 0,
            stop_reason: StopReason::Drained,
        }
    }

    /// Fold one finished batch into the running totals
    pub fn absorb(&mut self, batch: &BatchStats) {
        self.processed += batch.processed;
        self.updated += batch.updated;
        self.skipped += batch.skipped;
        self.failed_matches += batch.failed_matches;
        self.retry_deferred += batch.retry_deferred;
        self.errors += batch.errors;
        self.batches += 1;
    }
}

/// Reconciler → orchestrator progress channel message
#[derive(Debug, Clone)]
pub enum ProgressMessage {
    Batch {
        provider: &'static str,
        stats: BatchStats,
    },
    Finished {
        provider: &'static str,
        summary: ReconcileSummary,
    },
}

/// Outcome of a whole tenant run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub user_id: i64,
    pub run_id: Uuid,
    pub phase: SyncPhase,
    pub total_to_process: u64,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed_matches: u64,
    pub retry_deferred: u64,
    pub errors: u64,
    pub duration_ms: u64,
    pub providers: BTreeMap<String, ReconcileSummary>,
}
