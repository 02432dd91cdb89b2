//! Server-Sent Events for sync progress streaming

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// Only forward events of this tenant
    pub user_id: Option<i64>,
}

/// GET /sync/events - SSE stream of sync events
///
/// Streams SyncStarted, SyncProgress, ProviderCompleted, SyncCompleted and
/// SyncFailed, optionally filtered to one tenant with `?user_id=`.
pub async fn sync_event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = ?query.user_id, "New SSE client connected to sync events");

    let mut rx = state.event_bus.subscribe();
    let filter = query.user_id;

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "SSE: client lagged, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if filter.is_some_and(|user_id| user_id != event.user_id()) {
                        continue;
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting sync event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
