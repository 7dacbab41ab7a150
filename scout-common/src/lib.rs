//! # Vacancy Scout Common Library
//!
//! Shared code for the scout crates:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Event types (ScoutEvent enum) and the EventBus
//! - Human-readable duration formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use error::{Error, Result};
