//! Event types for the CODHub event system
//!
//! Provides the shared sync event definitions and the EventBus used to fan
//! them out to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Phase of a tenant sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Run acquired, counting work and building caches
    Preparing,
    /// Provider reconcilers running
    Syncing,
    /// Run finished successfully
    Completed,
    /// Run aborted by a systemic failure
    Error,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Preparing => "preparing",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Completed => "completed",
            SyncPhase::Error => "error",
        }
    }

    /// Parse the stored column value; unknown values fall back to `Preparing`
    pub fn parse(value: &str) -> Self {
        match value {
            "syncing" => SyncPhase::Syncing,
            "completed" => SyncPhase::Completed,
            "error" => SyncPhase::Error,
            _ => SyncPhase::Preparing,
        }
    }

    /// Terminal phases end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Error)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync event types
///
/// Broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A tenant run acquired the session and started preparing
    SyncStarted {
        user_id: i64,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Aggregate progress changed
    SyncProgress {
        user_id: i64,
        run_id: Uuid,
        phase: SyncPhase,
        processed: u64,
        total_to_process: u64,
        percentage: u8,
        version: i64,
        timestamp: DateTime<Utc>,
    },

    /// One provider reconciler finished its loop
    ProviderCompleted {
        user_id: i64,
        run_id: Uuid,
        provider: String,
        processed: u64,
        updated: u64,
        skipped: u64,
        errors: u64,
        stop_reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Run completed
    SyncCompleted {
        user_id: i64,
        run_id: Uuid,
        processed: u64,
        updated: u64,
        skipped: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run ended in the error phase
    SyncFailed {
        user_id: i64,
        run_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted { .. } => "SyncStarted",
            SyncEvent::SyncProgress { .. } => "SyncProgress",
            SyncEvent::ProviderCompleted { .. } => "ProviderCompleted",
            SyncEvent::SyncCompleted { .. } => "SyncCompleted",
            SyncEvent::SyncFailed { .. } => "SyncFailed",
        }
    }

    /// Tenant the event belongs to
    pub fn user_id(&self) -> i64 {
        match self {
            SyncEvent::SyncStarted { user_id, .. }
            | SyncEvent::SyncProgress { user_id, .. }
            | SyncEvent::ProviderCompleted { user_id, .. }
            | SyncEvent::SyncCompleted { user_id, .. }
            | SyncEvent::SyncFailed { user_id, .. } => *user_id,
        }
    }
}

/// Broadcast bus for sync events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers reached
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
