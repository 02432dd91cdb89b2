//! Data models for codhub-reconcile
//!
//! - Sync session aggregate (per-tenant run state)
//! - Staging records and canonical orders
//! - Operations and tenant order statuses
//! - Reconciliation outcomes and summaries

pub mod canonical_order;
pub mod operation;
pub mod order_status;
pub mod reconcile_result;
pub mod staging_record;
pub mod sync_session;

pub use canonical_order::CanonicalOrder;
pub use operation::{Operation, WarehouseAccount};
pub use order_status::OrderStatus;
pub use reconcile_result::{
    BatchStats, MatchStrategy, ProgressMessage, ReconcileSummary, RecordOutcome, StopReason,
    SyncSummary,
};
pub use staging_record::{RecipientContact, StagingRecord, StagingRow};
pub use sync_session::{ProviderProgress, SyncSession};
