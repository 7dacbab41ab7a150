//! Multi-stage search state machine
//!
//! A session progresses through three sequential stages:
//! COLLECTING → FILTERING → ENRICHING → COMPLETED
//!
//! `paused`, `stopped` and `error` are reachable from any active stage;
//! `completed`, `stopped` and `error` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStage {
    /// Scrape every enabled source for every search position
    Collecting,
    /// Apply blacklist/whitelist rules
    Filtering,
    /// LLM enrichment of surviving vacancies
    Enriching,
    /// All stages finished
    Completed,
}

impl SearchStage {
    /// The three working stages, in execution order
    pub const ACTIVE: [SearchStage; 3] = [
        SearchStage::Collecting,
        SearchStage::Filtering,
        SearchStage::Enriching,
    ];

    /// Stage following this one
    pub fn next(&self) -> SearchStage {
        match self {
            SearchStage::Collecting => SearchStage::Filtering,
            SearchStage::Filtering => SearchStage::Enriching,
            SearchStage::Enriching | SearchStage::Completed => SearchStage::Completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStage::Collecting => "collecting",
            SearchStage::Filtering => "filtering",
            SearchStage::Enriching => "enriching",
            SearchStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Stopped,
    Error,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Stopped | StageStatus::Error
        )
    }
}

/// Progress of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    pub status: StageStatus,

    /// Percentage complete (0.0 - 100.0)
    pub progress: f64,

    pub items_processed: usize,

    /// Total items; 0 until known
    pub items_total: usize,

    pub errors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_confidence: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for StageProgress {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            progress: 0.0,
            items_processed: 0,
            items_total: 0,
            errors: Vec::new(),
            eta_seconds: None,
            eta_confidence: None,
            started_at: None,
            completed_at: None,
        }
    }
}

impl StageProgress {
    /// Update item counters, keeping `items_processed <= items_total`
    pub fn set_items(&mut self, processed: usize, total: usize) {
        self.items_total = total;
        self.items_processed = processed.min(total);
        self.progress = if total > 0 {
            (self.items_processed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
    }

    /// Apply a status change; returns false when the transition is not allowed
    ///
    /// Stage status only moves forward, except `paused → running`.
    pub fn transition(&mut self, next: StageStatus) -> bool {
        let allowed = match (self.status, next) {
            (a, b) if a == b => true,
            (StageStatus::Pending, _) => true,
            (StageStatus::Running, StageStatus::Pending) => false,
            (StageStatus::Running, _) => true,
            (StageStatus::Paused, StageStatus::Pending) => false,
            (StageStatus::Paused, _) => true,
            // Crash-recovered stages re-enter from stopped
            (StageStatus::Stopped, StageStatus::Running) => true,
            _ => false,
        };
        if allowed {
            self.status = next;
        }
        allowed
    }

    fn clear_eta(&mut self) {
        self.eta_seconds = None;
        self.eta_confidence = None;
    }
}

/// Progress of all three stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSet {
    pub collecting: StageProgress,
    pub filtering: StageProgress,
    pub enriching: StageProgress,
}

impl StageSet {
    pub fn get(&self, stage: SearchStage) -> Option<&StageProgress> {
        match stage {
            SearchStage::Collecting => Some(&self.collecting),
            SearchStage::Filtering => Some(&self.filtering),
            SearchStage::Enriching => Some(&self.enriching),
            SearchStage::Completed => None,
        }
    }

    pub fn get_mut(&mut self, stage: SearchStage) -> Option<&mut StageProgress> {
        match stage {
            SearchStage::Collecting => Some(&mut self.collecting),
            SearchStage::Filtering => Some(&mut self.filtering),
            SearchStage::Enriching => Some(&mut self.enriching),
            SearchStage::Completed => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SearchStage, &StageProgress)> {
        [
            (SearchStage::Collecting, &self.collecting),
            (SearchStage::Filtering, &self.filtering),
            (SearchStage::Enriching, &self.enriching),
        ]
        .into_iter()
    }
}

/// Accumulated LLM token usage and cost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub requests: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl LlmUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Externally visible state of one search session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStageProgress {
    pub session_id: String,
    pub status: SessionStatus,
    pub current_stage: SearchStage,
    pub stages: StageSet,

    /// Last stage that finished completely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_stage: Option<SearchStage>,

    /// Overall progress across all stages (0.0 - 100.0)
    pub overall_progress: f64,

    pub start_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub errors: Vec<String>,

    pub can_pause: bool,
    pub can_resume: bool,
    pub can_stop: bool,

    pub jobs_collected: usize,
    pub jobs_filtered: usize,
    pub jobs_skipped: usize,
    pub jobs_enriched: usize,

    pub llm_usage: LlmUsage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_confidence: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_formatted: Option<String>,
}

impl MultiStageProgress {
    /// Fresh session: running, collecting stage entered
    pub fn new(session_id: impl Into<String>) -> Self {
        let mut progress = Self {
            session_id: session_id.into(),
            status: SessionStatus::Running,
            current_stage: SearchStage::Collecting,
            stages: StageSet::default(),
            last_completed_stage: None,
            overall_progress: 0.0,
            start_time: Utc::now(),
            end_time: None,
            errors: Vec::new(),
            can_pause: false,
            can_resume: false,
            can_stop: false,
            jobs_collected: 0,
            jobs_filtered: 0,
            jobs_skipped: 0,
            jobs_enriched: 0,
            llm_usage: LlmUsage::default(),
            eta_seconds: None,
            eta_confidence: None,
            eta_formatted: None,
        };
        progress.refresh_controls();
        progress
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Stopped | SessionStatus::Error
        )
    }

    /// Stage progress of the current stage (None once completed)
    pub fn current(&self) -> Option<&StageProgress> {
        self.stages.get(self.current_stage)
    }

    /// Enter a stage and mark it running
    pub fn begin_stage(&mut self, stage: SearchStage) {
        self.current_stage = stage;
        if let Some(progress) = self.stages.get_mut(stage) {
            progress.transition(StageStatus::Running);
            if progress.started_at.is_none() {
                progress.started_at = Some(Utc::now());
            }
        }
        self.recompute_overall();
    }

    /// Mark a stage finished; its counters are closed out at 100%
    pub fn complete_stage(&mut self, stage: SearchStage) {
        if let Some(progress) = self.stages.get_mut(stage) {
            progress.transition(StageStatus::Completed);
            let total = progress.items_total.max(progress.items_processed);
            progress.set_items(total, total);
            progress.progress = 100.0;
            progress.completed_at = Some(Utc::now());
            progress.clear_eta();
        }
        self.last_completed_stage = Some(stage);
        self.recompute_overall();
    }

    /// Update the item counters of a stage
    pub fn update_stage_items(&mut self, stage: SearchStage, processed: usize, total: usize) {
        if let Some(progress) = self.stages.get_mut(stage) {
            progress.set_items(processed, total);
        }
        self.recompute_overall();
    }

    /// Record an error against a stage without failing it
    pub fn add_stage_error(&mut self, stage: SearchStage, error: impl Into<String>) {
        if let Some(progress) = self.stages.get_mut(stage) {
            progress.errors.push(error.into());
        }
    }

    pub fn mark_paused(&mut self) {
        self.status = SessionStatus::Paused;
        let stage = self.current_stage;
        if let Some(progress) = self.stages.get_mut(stage) {
            if progress.status == StageStatus::Running {
                progress.transition(StageStatus::Paused);
            }
        }
        self.refresh_controls();
    }

    pub fn mark_resumed(&mut self) {
        self.status = SessionStatus::Running;
        self.end_time = None;
        let stage = self.current_stage;
        if let Some(progress) = self.stages.get_mut(stage) {
            if matches!(progress.status, StageStatus::Paused | StageStatus::Stopped) {
                progress.transition(StageStatus::Running);
            }
        }
        self.refresh_controls();
    }

    /// Terminal stop; `resumable` is only true for crash-recovered sessions
    pub fn mark_stopped(&mut self, resumable: bool) {
        self.status = SessionStatus::Stopped;
        self.end_time = Some(Utc::now());
        let stage = self.current_stage;
        if let Some(progress) = self.stages.get_mut(stage) {
            if !progress.status.is_terminal() && progress.status != StageStatus::Pending {
                progress.transition(StageStatus::Stopped);
            }
            progress.clear_eta();
        }
        self.clear_eta();
        self.refresh_controls();
        self.can_resume = resumable && self.current_stage != SearchStage::Completed;
    }

    pub fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
        self.current_stage = SearchStage::Completed;
        self.end_time = Some(Utc::now());
        self.overall_progress = 100.0;
        self.clear_eta();
        self.refresh_controls();
    }

    /// Stage-fatal error: fails the stage and the session
    pub fn mark_error(&mut self, stage: SearchStage, error: impl Into<String>) {
        let error = error.into();
        if let Some(progress) = self.stages.get_mut(stage) {
            progress.transition(StageStatus::Error);
            progress.errors.push(error.clone());
            progress.clear_eta();
        }
        self.errors.push(format!("{}: {}", stage, error));
        self.status = SessionStatus::Error;
        self.end_time = Some(Utc::now());
        self.clear_eta();
        self.refresh_controls();
    }

    /// Recompute the pause/resume/stop affordances from the status
    pub fn refresh_controls(&mut self) {
        self.can_pause = self.status == SessionStatus::Running;
        self.can_resume = self.status == SessionStatus::Paused;
        self.can_stop = matches!(self.status, SessionStatus::Running | SessionStatus::Paused);
    }

    /// Overall progress is the mean of the three stage percentages
    pub fn recompute_overall(&mut self) {
        let sum: f64 = self.stages.iter().map(|(_, p)| p.progress).sum();
        self.overall_progress = (sum / SearchStage::ACTIVE.len() as f64).clamp(0.0, 100.0);
    }

    pub fn clear_eta(&mut self) {
        self.eta_seconds = None;
        self.eta_confidence = None;
        self.eta_formatted = None;
    }

    /// Elapsed seconds since the session started (or until it ended)
    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_seconds().max(0) as u64
    }
}
