//! Durable session snapshots
//!
//! A snapshot holds everything needed to resume a session after a restart:
//! progress, settings (without secrets), vacancies and the collection checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CollectionCheckpoint, MultiStageProgress, SearchSettings, SearchStage, SessionStatus, Vacancy,
};

/// Serialized state of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,

    /// Assigned by the store on save
    #[serde(default)]
    pub snapshot_version: i64,

    pub saved_at: DateTime<Utc>,

    pub progress: MultiStageProgress,

    pub settings: SearchSettings,

    #[serde(default)]
    pub vacancies: Vec<Vacancy>,

    /// Partial collection state (empty once collection completed)
    #[serde(default)]
    pub checkpoint: CollectionCheckpoint,
}

impl SessionSnapshot {
    pub fn new(
        progress: MultiStageProgress,
        settings: &SearchSettings,
        vacancies: Vec<Vacancy>,
        checkpoint: CollectionCheckpoint,
    ) -> Self {
        Self {
            session_id: progress.session_id.clone(),
            snapshot_version: 0,
            saved_at: Utc::now(),
            progress,
            settings: settings.sanitized(),
            vacancies,
            checkpoint,
        }
    }

    /// Strip every secret in place
    pub fn sanitize(&mut self) {
        self.settings = self.settings.sanitized();
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            session_id: self.session_id.clone(),
            snapshot_version: self.snapshot_version,
            saved_at: self.saved_at,
            status: self.progress.status,
            current_stage: self.progress.current_stage,
            overall_progress: self.progress.overall_progress,
            jobs_collected: self.progress.jobs_collected,
            jobs_filtered: self.progress.jobs_filtered,
            jobs_enriched: self.progress.jobs_enriched,
            can_resume: self.progress.can_resume,
            start_time: self.progress.start_time,
            end_time: self.progress.end_time,
        }
    }
}

/// Listing entry for persisted sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub session_id: String,
    pub snapshot_version: i64,
    pub saved_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub current_stage: SearchStage,
    pub overall_progress: f64,
    pub jobs_collected: usize,
    pub jobs_filtered: usize,
    pub jobs_enriched: usize,
    pub can_resume: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}
