//! HTTP API handlers for scout-search
//!
//! REST endpoints for the multi-stage search plus an SSE event stream.

pub mod health;
pub mod multi_stage;
pub mod sse;

pub use health::health_routes;
pub use multi_stage::multi_stage_routes;
pub use sse::search_event_stream;
