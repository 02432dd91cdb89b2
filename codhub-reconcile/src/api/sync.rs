//! Sync trigger and progress endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::SyncSession;
use crate::{ApiError, ApiResult, AppState};

/// POST /sync/:user_id/trigger request body
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    /// Id of the active run this trigger continues
    #[serde(default)]
    pub continuation: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub run_id: Uuid,
}

/// POST /sync/:user_id/trigger
///
/// 202 with the new run id, or 409 while another run is active.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Option<Json<TriggerRequest>>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let continuation = body.and_then(|Json(request)| request.continuation);

    let run_id = state
        .orchestrator
        .trigger_reconciliation(user_id, continuation)
        .await
        .map_err(|e| {
            if !matches!(e, codhub_common::Error::Conflict(_)) {
                error!(user_id, error = %e, "Failed to start sync");
            }
            ApiError::from(e)
        })?;

    info!(user_id, run_id = %run_id, continuation = ?continuation, "Sync triggered");
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { run_id })))
}

/// GET /sync/:user_id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<SyncSession>> {
    let session = state.orchestrator.get_progress(user_id).await?;
    Ok(Json(session))
}

/// POST /sync/:user_id/reset
pub async fn reset_progress(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<SyncSession>> {
    let session = state.orchestrator.reset_progress(user_id).await?;
    Ok(Json(session))
}

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/:user_id/trigger", post(trigger_sync))
        .route("/sync/:user_id/progress", get(get_progress))
        .route("/sync/:user_id/reset", post(reset_progress))
        .route("/sync/events", get(super::sync_event_stream))
}
