//! Business logic services
//!
//! Identifier normalization, operation resolution, order matching, the
//! per-provider reconcilers and the tenant-level sync orchestration.

pub mod normalizer;
pub mod operation_resolver;
pub mod order_matcher;
pub mod progress_store;
pub mod provider_reconciler;
pub mod providers;
pub mod sync_orchestrator;

pub use operation_resolver::OperationResolver;
pub use order_matcher::{MatchQuery, OrderMatch, OrderMatcher};
pub use progress_store::ProgressStore;
pub use provider_reconciler::ProviderReconciler;
pub use sync_orchestrator::SyncOrchestrator;
