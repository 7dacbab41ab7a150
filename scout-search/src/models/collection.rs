//! Collection stage data: live progress, resumable checkpoint and final result

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::Vacancy;

/// Live progress of one collection run
///
/// Shared between the scheduler (writer) and the orchestrator tick (reader).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub total_sources: usize,
    pub sources_completed: usize,
    /// (source × position) pairs in this run
    pub units_total: usize,
    pub units_completed: usize,
    /// Jobs of completed sources; never decreases within a run
    pub jobs_collected: usize,
    pub current_source: Option<String>,
    pub errors: Vec<String>,
    pub is_complete: bool,
}

/// Terminal state of a source within a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    InProgress,
    Completed,
    Failed { error: String, attempts: u32 },
}

/// Per-source checkpoint: positions already scraped and their vacancies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCheckpoint {
    pub state: SourceState,
    pub completed_positions: BTreeSet<String>,
    pub vacancies: Vec<Vacancy>,
}

impl Default for SourceCheckpoint {
    fn default() -> Self {
        Self {
            state: SourceState::InProgress,
            completed_positions: BTreeSet::new(),
            vacancies: Vec::new(),
        }
    }
}

impl SourceCheckpoint {
    pub fn is_finished(&self) -> bool {
        !matches!(self.state, SourceState::InProgress)
    }
}

/// Resumable state of a collection stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionCheckpoint {
    pub sources: BTreeMap<String, SourceCheckpoint>,
}

impl CollectionCheckpoint {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Completed (source, position) pairs recorded so far
    pub fn completed_units(&self) -> usize {
        self.sources
            .values()
            .map(|s| s.completed_positions.len())
            .sum()
    }

    /// Vacancies held by completed or still in-progress sources
    pub fn collected_jobs(&self) -> usize {
        self.sources
            .values()
            .filter(|s| !matches!(s.state, SourceState::Failed { .. }))
            .map(|s| s.vacancies.len())
            .sum()
    }
}

/// A source that failed after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub message: String,
    pub attempts: u32,
}

/// Outcome of a collection run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionResult {
    /// False iff at least one source ultimately failed
    pub success: bool,
    pub vacancies: Vec<Vacancy>,
    pub total_collected: usize,
    /// Sources that finished successfully
    pub sources_processed: Vec<String>,
    /// One entry per failed source
    pub errors: Vec<SourceError>,
    /// True when the run stopped early at a checkpoint (pause/stop)
    pub interrupted: bool,
    /// State to continue from when interrupted
    pub checkpoint: CollectionCheckpoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_counts_exclude_failed_sources() {
        let mut checkpoint = CollectionCheckpoint::default();
        let mut ok = SourceCheckpoint::default();
        ok.completed_positions.insert("devops".to_string());
        ok.completed_positions.insert("sre".to_string());
        checkpoint.sources.insert("linkedin".to_string(), ok);

        let failed = SourceCheckpoint {
            state: SourceState::Failed {
                error: "timeout".to_string(),
                attempts: 4,
            },
            ..Default::default()
        };
        checkpoint.sources.insert("indeed".to_string(), failed);

        assert_eq!(checkpoint.completed_units(), 2);
        assert_eq!(checkpoint.collected_jobs(), 0);
        assert!(checkpoint.sources["indeed"].is_finished());
        assert!(!checkpoint.sources["linkedin"].is_finished());
    }
}
