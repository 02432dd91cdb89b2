//! Provider reconciler
//!
//! Drains one provider's unprocessed staging rows for one tenant run.
//! Batches are keyset-paginated by staging id, so a row left unprocessed
//! (retry policy or per-row error) is not read again in the same run. The
//! loop stops when a batch comes back empty or a safety cap is reached.

use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use codhub_common::time::now_rfc3339;
use codhub_common::Result;

use crate::config::SyncLimits;
use crate::db::orders::{apply_match, MatchMerge};
use crate::db::staging;
use crate::models::{
    BatchStats, ProgressMessage, RecipientContact, ReconcileSummary, RecordOutcome, StagingRecord,
    StopReason,
};
use crate::services::operation_resolver::OperationResolver;
use crate::services::order_matcher::{MatchQuery, OrderMatcher};
use crate::services::providers::{NoMatchPolicy, ProviderAdapter};
use crate::utils::retry_on_lock;

/// Payload stamp key for rows whose operation could not be resolved
pub const SKIPPED_STAMP: &str = "skipped";
/// Payload stamp key for terminal no-match rows
pub const FAILED_MATCH_STAMP: &str = "failedMatch";

/// Reconciles one provider's staging rows
pub struct ProviderReconciler {
    db: SqlitePool,
    adapter: Arc<dyn ProviderAdapter>,
    resolver: Arc<OperationResolver>,
    matcher: Arc<OrderMatcher>,
    limits: SyncLimits,
}

impl ProviderReconciler {
    pub fn new(
        db: SqlitePool,
        adapter: Arc<dyn ProviderAdapter>,
        resolver: Arc<OperationResolver>,
        matcher: Arc<OrderMatcher>,
        limits: SyncLimits,
    ) -> Self {
        Self {
            db,
            adapter,
            resolver,
            matcher,
            limits,
        }
    }

    /// Run the batch loop over the tenant's accounts for this provider
    ///
    /// Per-row failures are counted and skipped; a failed batch fetch aborts
    /// the loop with an error. When `progress` is given, one message is sent
    /// per batch and one when the loop ends.
    pub async fn run(
        &self,
        account_ids: &[i64],
        progress: Option<&mpsc::Sender<ProgressMessage>>,
    ) -> Result<ReconcileSummary> {
        let provider = self.adapter.key();
        let mut summary = ReconcileSummary::new(provider);
        let started = Instant::now();
        let mut cursor = 0i64;

        if account_ids.is_empty() {
            debug!(provider, "No active accounts for provider");
        }

        let stop_reason = loop {
            if summary.batches >= self.limits.max_iterations {
                break StopReason::IterationCap;
            }
            if summary.processed >= self.limits.max_records as u64 {
                break StopReason::RecordCap;
            }
            if started.elapsed() >= self.limits.max_run() {
                break StopReason::TimeCap;
            }

            let remaining = self.limits.max_records as u64 - summary.processed;
            let limit = (self.limits.batch_size as u64).min(remaining) as u32;

            let batch =
                staging::fetch_batch(&self.db, self.adapter.table(), account_ids, cursor, limit)
                    .await?;
            if batch.is_empty() {
                break StopReason::Drained;
            }

            let mut stats = BatchStats::default();
            for row in &batch {
                cursor = cursor.max(row.id);
                let outcome = match &row.record {
                    Ok(record) => self.process_record(record).await,
                    Err(e) => RecordOutcome::Error(format!("malformed staging row: {}", e)),
                };
                if let RecordOutcome::Error(ref message) = outcome {
                    warn!(provider, staging_id = row.id, error = %message, "Staging row failed");
                }
                stats.record(&outcome);
            }
            summary.absorb(&stats);

            debug!(
                provider,
                batch = summary.batches,
                processed = stats.processed,
                updated = stats.updated,
                skipped = stats.skipped,
                errors = stats.errors,
                "Batch reconciled"
            );

            if let Some(tx) = progress {
                if tx.send(ProgressMessage::Batch { provider, stats }).await.is_err() {
                    debug!(provider, "Progress receiver dropped");
                }
            }
        };

        summary.stop_reason = stop_reason;

        info!(
            provider,
            processed = summary.processed,
            updated = summary.updated,
            skipped = summary.skipped,
            failed_matches = summary.failed_matches,
            retry_deferred = summary.retry_deferred,
            errors = summary.errors,
            batches = summary.batches,
            stop_reason = stop_reason.as_str(),
            "Provider reconciliation finished"
        );

        if let Some(tx) = progress {
            let _ = tx
                .send(ProgressMessage::Finished {
                    provider,
                    summary: summary.clone(),
                })
                .await;
        }

        Ok(summary)
    }

    /// Examine one staging row; never fails, errors become an outcome
    pub async fn process_record(&self, record: &StagingRecord) -> RecordOutcome {
        match self.try_process_record(record).await {
            Ok(outcome) => outcome,
            Err(e) => RecordOutcome::Error(e.to_string()),
        }
    }

    async fn try_process_record(&self, record: &StagingRecord) -> Result<RecordOutcome> {
        let provider = self.adapter.key();
        let table = self.adapter.table();
        let max_wait = self.limits.max_lock_wait_ms;
        let order_number = self.adapter.extract_order_number(record);

        let Some(operation) = self.resolver.resolve(record.account_id, order_number.as_deref())
        else {
            let at = now_rfc3339();
            let closed = retry_on_lock("stamp unresolved operation", max_wait, || {
                staging::close_with_stamp(&self.db, table, record.id, SKIPPED_STAMP, "operation_unresolved", &at)
            })
            .await?;
            debug!(provider, staging_id = record.id, "Operation unresolved, row skipped");
            return Ok(if closed {
                RecordOutcome::OperationUnresolved
            } else {
                RecordOutcome::AlreadyProcessed
            });
        };

        let contact = self.adapter.extract_contact(record);
        let query = MatchQuery {
            operation_id: operation.id,
            order_prefix: operation.order_prefix.as_deref(),
            order_number: order_number.as_deref(),
            email: contact.email.as_deref(),
            phone: contact.phone.as_deref(),
            name: contact.name.as_deref(),
            value: record.value,
            integration_date: operation.integration_started_at.as_deref(),
        };

        let Some(found) = self.matcher.find_match(&query).await? else {
            return match self.adapter.no_match_policy() {
                NoMatchPolicy::Retry => {
                    debug!(provider, staging_id = record.id, "No match, left for retry");
                    Ok(RecordOutcome::RetryDeferred)
                }
                NoMatchPolicy::Terminal => {
                    let at = now_rfc3339();
                    let closed = retry_on_lock("stamp failed match", max_wait, || {
                        staging::close_with_stamp(&self.db, table, record.id, FAILED_MATCH_STAMP, "no_matching_order", &at)
                    })
                    .await?;
                    debug!(provider, staging_id = record.id, "No match, row closed");
                    Ok(if closed {
                        RecordOutcome::FailedMatch
                    } else {
                        RecordOutcome::AlreadyProcessed
                    })
                }
            };
        };

        let synced_at = now_rfc3339();
        let mapped_status = record
            .status
            .as_deref()
            .and_then(|s| self.adapter.map_status(s));
        let provider_data = json!({
            "status": record.status,
            "mapped_status": mapped_status.map(|s| s.as_str()),
            "tracking_code": record.tracking_code,
            "provider_order_id": record.provider_order_id,
            "staging_id": record.id,
            "value": record.value,
            "match_strategy": found.strategy.as_str(),
            "synced_at": synced_at,
        });
        let fill_email = contact
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase());
        let fill_contact = RecipientContact {
            name: contact.name.clone(),
            email: fill_email,
            phone: contact.phone.clone(),
        };

        let merge = MatchMerge {
            order_id: found.order.id,
            provider_key: provider,
            staging_table: table,
            staging_id: record.id,
            link_order: self.adapter.supports_order_link(),
            mapped_status,
            tracking_number: record.tracking_code.as_deref().filter(|t| !t.trim().is_empty()),
            carrier_order_id: record.provider_order_id.as_deref().filter(|t| !t.trim().is_empty()),
            provider_data,
            contact: &fill_contact,
            value: record.value,
            synced_at: &synced_at,
        };

        let merged = retry_on_lock("apply match", max_wait, || apply_match(&self.db, &merge)).await?;
        if !merged {
            return Ok(RecordOutcome::AlreadyProcessed);
        }

        debug!(
            provider,
            staging_id = record.id,
            order_id = found.order.id,
            strategy = found.strategy.as_str(),
            "Staging row merged"
        );
        Ok(RecordOutcome::Matched {
            order_id: found.order.id,
            strategy: found.strategy,
        })
    }
}
