//! Event types for the scout event system
//!
//! Provides the shared event definitions and the EventBus used to stream
//! search session lifecycle and progress to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scout event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Stage and status names use the same lowercase strings as the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScoutEvent {
    /// A multi-stage search session was registered and its pipeline spawned
    SearchSessionStarted {
        session_id: String,
        /// Number of search positions requested
        positions: usize,
        /// Enabled source names
        sources: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A session moved from one stage to the next
    SearchStageChanged {
        session_id: String,
        /// Stage that finished (None on first entry)
        from_stage: Option<String>,
        /// Stage that starts
        to_stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress tick for the current stage
    SearchProgressUpdate {
        session_id: String,
        stage: String,
        items_processed: usize,
        items_total: usize,
        /// Overall progress across all stages (0.0 - 100.0)
        overall_progress: f64,
        /// Overall ETA in seconds, None when no reliable estimate exists
        eta_seconds: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// Session paused at a checkpoint
    SearchSessionPaused {
        session_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Session resumed
    SearchSessionResumed {
        session_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Session stopped by the user (terminal)
    SearchSessionStopped {
        session_id: String,
        stage: String,
        jobs_collected: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session finished all stages
    SearchSessionCompleted {
        session_id: String,
        jobs_collected: usize,
        jobs_filtered: usize,
        jobs_enriched: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Session failed with a stage-fatal error
    SearchSessionFailed {
        session_id: String,
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ScoutEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScoutEvent::SearchSessionStarted { .. } => "SearchSessionStarted",
            ScoutEvent::SearchStageChanged { .. } => "SearchStageChanged",
            ScoutEvent::SearchProgressUpdate { .. } => "SearchProgressUpdate",
            ScoutEvent::SearchSessionPaused { .. } => "SearchSessionPaused",
            ScoutEvent::SearchSessionResumed { .. } => "SearchSessionResumed",
            ScoutEvent::SearchSessionStopped { .. } => "SearchSessionStopped",
            ScoutEvent::SearchSessionCompleted { .. } => "SearchSessionCompleted",
            ScoutEvent::SearchSessionFailed { .. } => "SearchSessionFailed",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            ScoutEvent::SearchSessionStarted { session_id, .. }
            | ScoutEvent::SearchStageChanged { session_id, .. }
            | ScoutEvent::SearchProgressUpdate { session_id, .. }
            | ScoutEvent::SearchSessionPaused { session_id, .. }
            | ScoutEvent::SearchSessionResumed { session_id, .. }
            | ScoutEvent::SearchSessionStopped { session_id, .. }
            | ScoutEvent::SearchSessionCompleted { session_id, .. }
            | ScoutEvent::SearchSessionFailed { session_id, .. } => session_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use scout_common::events::{EventBus, ScoutEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ScoutEvent::SearchSessionPaused {
///     session_id: "s-1".to_string(),
///     stage: "collecting".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScoutEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScoutEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScoutEvent,
    ) -> Result<usize, broadcast::error::SendError<ScoutEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScoutEvent) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(ScoutEvent::SearchSessionPaused {
            session_id: "a".to_string(),
            stage: "filtering".to_string(),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(ScoutEvent::SearchStageChanged {
            session_id: "abc".to_string(),
            from_stage: Some("collecting".to_string()),
            to_stage: "filtering".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SearchStageChanged");
        assert_eq!(event.session_id(), "abc");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ScoutEvent::SearchSessionFailed {
            session_id: "x".to_string(),
            stage: "enriching".to_string(),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SearchSessionFailed");
        assert_eq!(json["stage"], "enriching");
    }
}
