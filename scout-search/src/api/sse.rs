//! Server-Sent Events (SSE) for search progress streaming
//!
//! Forwards every orchestrator event from the event bus. Clients may pass
//! `?session_id=` to receive the events of a single session only.

use crate::AppState;
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

/// GET /api/multi-stage/events query
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub session_id: Option<String>,
}

/// GET /api/multi-stage/events - SSE event stream for search sessions
///
/// Streams events:
/// - SearchSessionStarted
/// - SearchStageChanged
/// - SearchProgressUpdate
/// - SearchSessionPaused / SearchSessionResumed / SearchSessionStopped
/// - SearchSessionCompleted / SearchSessionFailed
pub async fn search_event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = ?filter.session_id, "New SSE client connected to search events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(wanted) = &filter.session_id {
                        if event.session_id() != wanted {
                            continue;
                        }
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting search event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagging, events dropped");
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
