//! codhub-reconcile library interface
//!
//! Staging reconciliation for the CODHub order platform: provider staging
//! rows are matched to canonical storefront orders and merged into them,
//! one tenant run at a time.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use codhub_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::SyncLimits;
use crate::services::SyncOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background failure, shared with the orchestrator
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, limits: SyncLimits) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), event_bus.clone(), limits));
        Self::with_orchestrator(db, event_bus, orchestrator)
    }

    pub fn with_orchestrator(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: Arc<SyncOrchestrator>,
    ) -> Self {
        let last_error = orchestrator.last_error();
        Self {
            db,
            event_bus,
            orchestrator,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
