//! Sync orchestrator
//!
//! Runs one tenant's reconciliation: acquires the tenant's session, counts
//! pending staging work, runs every provider reconciler concurrently and
//! folds their progress messages into the session aggregate. The
//! orchestrator task is the only writer of the aggregate during a run.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use codhub_common::events::{EventBus, SyncEvent};
use codhub_common::{Error, Result};

use crate::config::SyncLimits;
use crate::db::{operations, sessions, staging};
use crate::models::{ProgressMessage, ReconcileSummary, SyncSession, SyncSummary};
use crate::services::operation_resolver::OperationResolver;
use crate::services::order_matcher::OrderMatcher;
use crate::services::progress_store::ProgressStore;
use crate::services::provider_reconciler::ProviderReconciler;
use crate::services::providers::{all_providers, ProviderAdapter};
use crate::utils::retry_on_lock;

/// Progress channel depth between reconcilers and the orchestrator
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Work discovered while preparing a run
struct PreparedRun {
    resolver: Arc<OperationResolver>,
    accounts: HashMap<String, Vec<i64>>,
    total_to_process: u64,
}

pub struct SyncOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    limits: SyncLimits,
    progress: ProgressStore,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    /// Most recent background run failure
    last_error: Arc<RwLock<Option<String>>>,
}

impl SyncOrchestrator {
    pub fn new(db: SqlitePool, event_bus: EventBus, limits: SyncLimits) -> Self {
        let progress = ProgressStore::new(db.clone(), limits.progress_grace(), limits.max_lock_wait_ms);
        Self {
            db,
            event_bus,
            limits,
            progress,
            providers: all_providers(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Shared slot holding the last background failure message
    pub fn last_error(&self) -> Arc<RwLock<Option<String>>> {
        Arc::clone(&self.last_error)
    }

    /// Current progress snapshot (resets stale counters)
    pub async fn get_progress(&self, user_id: i64) -> Result<SyncSession> {
        self.progress.get(user_id).await
    }

    /// Administrative reset of a tenant's session
    pub async fn reset_progress(&self, user_id: i64) -> Result<SyncSession> {
        self.progress.reset(user_id).await
    }

    /// Start a run in the background and return its id
    ///
    /// The session is acquired before returning, so a busy tenant is
    /// reported to the caller as [`Error::Conflict`].
    pub async fn trigger_reconciliation(
        self: &Arc<Self>,
        user_id: i64,
        continuation: Option<Uuid>,
    ) -> Result<Uuid> {
        let session = self.acquire(user_id, continuation).await?;
        let run_id = session.run_id.unwrap_or_default();

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.execute(session).await {
                Ok(summary) => debug!(
                    user_id,
                    run_id = %run_id,
                    processed = summary.processed,
                    "Background reconciliation finished"
                ),
                Err(e) => {
                    error!(
                        user_id,
                        run_id = %run_id,
                        error = %e,
                        "Background reconciliation failed"
                    );
                    *orchestrator.last_error.write().await =
                        Some(format!("user {} run {}: {}", user_id, run_id, e));
                }
            }
        });

        Ok(run_id)
    }

    /// Run a reconciliation to completion on the current task
    pub async fn reconcile(&self, user_id: i64, continuation: Option<Uuid>) -> Result<SyncSummary> {
        let session = self.acquire(user_id, continuation).await?;
        self.execute(session).await
    }

    async fn acquire(&self, user_id: i64, continuation: Option<Uuid>) -> Result<SyncSession> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let stale_before = now - self.limits.stale_lock();

        let version = retry_on_lock("acquire sync session", self.limits.max_lock_wait_ms, || {
            sessions::try_acquire(&self.db, user_id, continuation, run_id, now, stale_before)
        })
        .await?;

        match version {
            Some(version) => {
                info!(user_id, run_id = %run_id, version, "Sync session acquired");
                Ok(SyncSession::acquired(user_id, run_id, version, now))
            }
            None => {
                debug!(user_id, "Sync already running, trigger refused");
                Err(Error::Conflict(format!(
                    "A sync is already running for user {}",
                    user_id
                )))
            }
        }
    }

    async fn execute(&self, mut session: SyncSession) -> Result<SyncSummary> {
        let started = Instant::now();
        let user_id = session.user_id;
        let run_id = session
            .run_id
            .ok_or_else(|| Error::Internal("session has no run id".to_string()))?;

        self.event_bus.emit_lossy(SyncEvent::SyncStarted {
            user_id,
            run_id,
            timestamp: Utc::now(),
        });

        let prepared = match self.prepare(user_id).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.fail_run(&mut session, format!("Preparation failed: {}", e)).await;
                return Err(e);
            }
        };

        session.begin_syncing(prepared.total_to_process);
        let mut current = self.persist(&mut session).await;
        if current {
            self.emit_progress(&session);
        }
        info!(
            user_id,
            run_id = %run_id,
            total_to_process = prepared.total_to_process,
            "Reconciliation started"
        );

        let matcher = Arc::new(OrderMatcher::new(self.db.clone()));
        let (tx, mut rx) = mpsc::channel::<ProgressMessage>(PROGRESS_CHANNEL_CAPACITY);
        let mut tasks = JoinSet::new();

        for adapter in &self.providers {
            let account_ids = prepared
                .accounts
                .get(adapter.key())
                .cloned()
                .unwrap_or_default();
            let reconciler = ProviderReconciler::new(
                self.db.clone(),
                Arc::clone(adapter),
                Arc::clone(&prepared.resolver),
                Arc::clone(&matcher),
                self.limits,
            );
            let tx = tx.clone();
            tasks.spawn(async move { reconciler.run(&account_ids, Some(&tx)).await });
        }
        drop(tx);

        while let Some(message) = rx.recv().await {
            session.apply(&message);

            if let ProgressMessage::Finished { provider, summary } = &message {
                self.event_bus.emit_lossy(SyncEvent::ProviderCompleted {
                    user_id,
                    run_id,
                    provider: provider.to_string(),
                    processed: summary.processed,
                    updated: summary.updated,
                    skipped: summary.skipped,
                    errors: summary.errors,
                    stop_reason: summary.stop_reason.as_str().to_string(),
                    timestamp: Utc::now(),
                });
            }

            if current {
                current = self.persist(&mut session).await;
                if current {
                    self.emit_progress(&session);
                }
            }
        }

        let mut providers: BTreeMap<String, ReconcileSummary> = BTreeMap::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(summary)) => {
                    providers.insert(summary.provider.clone(), summary);
                }
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(e) => failures.push(format!("reconciler task aborted: {}", e)),
            }
        }

        if !failures.is_empty() {
            let message = failures.join("; ");
            if current {
                self.fail_run(&mut session, message.clone()).await;
            }
            return Err(Error::Internal(message));
        }

        session.complete(Utc::now());
        let duration_ms = started.elapsed().as_millis() as u64;

        if current {
            match self.persist_terminal(&mut session).await {
                Ok(true) => {
                    self.emit_progress(&session);
                    self.event_bus.emit_lossy(SyncEvent::SyncCompleted {
                        user_id,
                        run_id,
                        processed: session.processed,
                        updated: session.updated,
                        skipped: session.skipped,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    let message = format!("Failed to record completion: {}", e);
                    self.fail_run(&mut session, message.clone()).await;
                    return Err(Error::Internal(message));
                }
            }
        }

        info!(
            user_id,
            run_id = %run_id,
            processed = session.processed,
            updated = session.updated,
            skipped = session.skipped,
            errors = session.errors,
            duration_ms,
            "Reconciliation completed"
        );

        Ok(SyncSummary {
            user_id,
            run_id,
            phase: session.phase,
            total_to_process: session.total_to_process,
            processed: session.processed,
            created: session.created,
            updated: session.updated,
            skipped: session.skipped,
            failed_matches: session.failed_matches,
            retry_deferred: providers.values().map(|p| p.retry_deferred).sum(),
            errors: session.errors,
            duration_ms,
            providers,
        })
    }

    /// Promote accounts, build the resolution cache and count pending rows
    async fn prepare(&self, user_id: i64) -> Result<PreparedRun> {
        let promoted = operations::promote_linked_pending_accounts(&self.db, user_id).await?;
        if promoted > 0 {
            info!(user_id, promoted, "Linked pending warehouse accounts activated");
        }

        let resolver = Arc::new(OperationResolver::load(&self.db, user_id).await?);

        let mut accounts: HashMap<String, Vec<i64>> = HashMap::new();
        for account in operations::load_active_accounts(&self.db, user_id).await? {
            accounts.entry(account.provider).or_default().push(account.id);
        }

        let mut total_to_process = 0u64;
        for adapter in &self.providers {
            let Some(account_ids) = accounts.get(adapter.key()) else {
                continue;
            };
            let pending = staging::count_unprocessed(&self.db, adapter.table(), account_ids).await?;
            debug!(user_id, provider = adapter.key(), pending, "Pending staging rows");
            total_to_process += pending;
        }

        Ok(PreparedRun {
            resolver,
            accounts,
            total_to_process,
        })
    }

    /// Persist the aggregate; false once another run owns the session
    async fn persist(&self, session: &mut SyncSession) -> bool {
        match self.progress.save(session).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    user_id = session.user_id,
                    run_id = ?session.run_id,
                    "Session taken over by another run, discarding progress"
                );
                false
            }
            Err(e) => {
                // Counters stay in memory; the next write carries them
                warn!(user_id = session.user_id, error = %e, "Failed to persist sync progress");
                true
            }
        }
    }

    /// Completion or failure write; there is no later write to carry a
    /// failed one, so errors are returned
    async fn persist_terminal(&self, session: &mut SyncSession) -> Result<bool> {
        let saved = self.progress.save(session).await?;
        if !saved {
            warn!(
                user_id = session.user_id,
                run_id = ?session.run_id,
                "Session taken over by another run, final state discarded"
            );
        }
        Ok(saved)
    }

    async fn fail_run(&self, session: &mut SyncSession, message: String) {
        error!(user_id = session.user_id, run_id = ?session.run_id, error = %message, "Reconciliation failed");
        session.fail(message.clone(), Utc::now());
        let saved = match self.persist_terminal(session).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(
                    user_id = session.user_id,
                    error = %e,
                    "Failed to record run failure, session stays locked until stale"
                );
                false
            }
        };
        if saved {
            self.emit_progress(session);
            if let Some(run_id) = session.run_id {
                self.event_bus.emit_lossy(SyncEvent::SyncFailed {
                    user_id: session.user_id,
                    run_id,
                    message,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn emit_progress(&self, session: &SyncSession) {
        let Some(run_id) = session.run_id else {
            return;
        };
        self.event_bus.emit_lossy(SyncEvent::SyncProgress {
            user_id: session.user_id,
            run_id,
            phase: session.phase,
            processed: session.processed,
            total_to_process: session.total_to_process,
            percentage: session.percentage,
            version: session.version,
            timestamp: Utc::now(),
        });
    }
}
