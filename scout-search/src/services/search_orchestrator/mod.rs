//! Multi-stage search orchestrator
//!
//! # State Progression
//! COLLECTING → FILTERING → ENRICHING → COMPLETED
//!
//! # Architecture
//! Each stage is handled by a dedicated `stage_*` method in its own module:
//!
//! - **COLLECTING**: fan out across sources × positions via the collection scheduler
//! - **FILTERING**: blacklist/whitelist rules over collected vacancies
//! - **ENRICHING**: LLM enrichment of filtered vacancies
//!
//! One pipeline task per session writes stage progress. Control operations
//! (pause, resume, stop, delete) only flip the session status and cancel the
//! run token; the running stage observes the token at its next batch boundary
//! and returns with its partial results kept.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scout_common::events::{EventBus, ScoutEvent};

use super::collection::CollectionConfig;
use super::enrichment::LlmClientFactory;
use super::eta::{EtaConfig, EtaEngine};
use super::markdown_export::export_vacancies;
use super::scraper::SharedScraper;
use super::session_registry::{SessionActive, SessionHandle, SessionRegistry, SessionState};
use super::snapshot_store::{SaveOutcome, SnapshotStore};
use crate::config::resolve_openai_api_key;
use crate::error::SearchError;
use crate::models::{
    MultiStageProgress, SearchSettings, SearchStage, SessionSnapshot, SessionStatus,
    SnapshotSummary, StageStatus, Vacancy, VacancyStatus,
};

// Stage modules (internal implementation)
mod stage_collecting;
mod stage_enriching;
mod stage_filtering;

/// Orchestrator tunables
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub collection: CollectionConfig,
    pub eta: EtaConfig,
    /// Progress tick interval while collecting (default: 1s)
    pub tick_interval: Duration,
    /// Vacancies filtered between two checkpoints (default: 50)
    pub filter_chunk_size: usize,
    /// Concurrent LLM requests (default: 3)
    pub max_concurrent_requests: usize,
    /// How long finished sessions stay in memory (default: 60 minutes)
    pub session_retention: Duration,
    /// OpenAI API key from the TOML config, lowest priority
    pub toml_api_key: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            eta: EtaConfig::default(),
            tick_interval: Duration::from_secs(1),
            filter_chunk_size: 50,
            max_concurrent_requests: 3,
            session_retention: Duration::from_secs(60 * 60),
            toml_api_key: None,
        }
    }
}

/// How a stage method returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Completed,
    /// Cancellation observed; partial results are in the session state
    Interrupted,
}

/// Start a multi-stage search
#[derive(Debug, Clone, Deserialize)]
pub struct StartSearchRequest {
    pub session_id: String,
    #[serde(default)]
    pub settings: SearchSettings,
}

/// Resume a paused (or crash-recovered) search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeSearchRequest {
    /// Replacement settings; snapshots never carry the API key
    #[serde(default)]
    pub settings: Option<SearchSettings>,
}

/// Acknowledgement of a control operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub session_id: String,
    pub status: SessionStatus,
    pub message: String,
}

impl SearchResponse {
    fn new(session_id: &str, status: SessionStatus, message: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: session_id.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Multi-stage search orchestrator service
#[derive(Clone)]
pub struct SearchOrchestrator {
    registry: SessionRegistry,
    scrapers: Arc<Vec<SharedScraper>>,
    store: Arc<dyn SnapshotStore>,
    llm_factory: Arc<dyn LlmClientFactory>,
    event_bus: EventBus,
    config: Arc<OrchestratorConfig>,
}

impl SearchOrchestrator {
    /// Create new orchestrator
    ///
    /// # Arguments
    /// * `scrapers` - One scraper per source name
    /// * `store` - Durable session snapshots
    /// * `llm_factory` - Builds the LLM client once a session's key is resolved
    /// * `event_bus` - Lifecycle and progress events
    pub fn new(
        scrapers: Vec<SharedScraper>,
        store: Arc<dyn SnapshotStore>,
        llm_factory: Arc<dyn LlmClientFactory>,
        event_bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        info!(
            scrapers = %scrapers.iter().map(|s| s.name()).collect::<Vec<_>>().join(", "),
            "Search orchestrator initialized"
        );
        Self {
            registry: SessionRegistry::new(),
            scrapers: Arc::new(scrapers),
            store,
            llm_factory,
            event_bus,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Source names with a registered scraper
    pub fn scraper_names(&self) -> Vec<String> {
        self.scrapers.iter().map(|s| s.name().to_string()).collect()
    }

    /// Register a session and spawn its pipeline; returns immediately
    pub async fn start_multi_stage_search(
        &self,
        request: StartSearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        let session_id = request.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(SearchError::Validation(
                "session_id must not be empty".to_string(),
            ));
        }
        let settings = self.prepare_settings(request.settings)?;
        let positions = settings.positions.len();
        let sources = settings.enabled_sources();

        let state = SessionState::new(MultiStageProgress::new(&session_id), settings);
        let handle = SessionHandle::new(state, self.config.eta);
        self.registry
            .insert(handle.clone())
            .await
            .map_err(|SessionActive(id)| SearchError::AlreadyRunning(id))?;

        info!(
            session_id = %session_id,
            positions,
            sources = %sources.join(", "),
            "Starting multi-stage search"
        );
        self.persist(&handle).await;

        {
            let mut control = handle.control.lock().await;
            let cancel = CancellationToken::new();
            control.cancel = cancel.clone();
            control.task = Some(self.spawn_pipeline(handle.clone(), cancel, None));
        }

        self.event_bus.emit_lossy(ScoutEvent::SearchSessionStarted {
            session_id: session_id.clone(),
            positions,
            sources,
            timestamp: Utc::now(),
        });

        Ok(SearchResponse::new(
            &session_id,
            SessionStatus::Running,
            "Multi-stage search started",
        ))
    }

    /// Copy of a session's progress with fresh ETA fields
    ///
    /// Falls back to the snapshot store for sessions no longer in memory.
    pub async fn get_progress(&self, session_id: &str) -> Option<MultiStageProgress> {
        let Some(handle) = self.registry.get(session_id).await else {
            return match self.store.load(session_id).await {
                Ok(snapshot) => snapshot.map(|s| s.progress),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Snapshot lookup failed");
                    None
                }
            };
        };

        let mut progress = handle.progress().await;
        if progress.status == SessionStatus::Running {
            let mut eta = handle.eta.lock().await;
            apply_eta(&mut eta, &mut progress);
        }
        Some(progress)
    }

    pub async fn pause_multi_stage_search(
        &self,
        session_id: &str,
    ) -> Result<SearchResponse, SearchError> {
        let handle = self.handle(session_id).await?;

        let stage = {
            let mut state = handle.state.write().await;
            if state.progress.status != SessionStatus::Running {
                return Err(invalid_state(&state.progress, "pause"));
            }
            state.progress.mark_paused();
            state.progress.clear_eta();
            state.clock.pause();
            state.progress.current_stage
        };
        handle.control.lock().await.cancel.cancel();

        info!(session_id = %session_id, stage = %stage, "Search paused");
        self.persist(&handle).await;
        self.event_bus.emit_lossy(ScoutEvent::SearchSessionPaused {
            session_id: session_id.to_string(),
            stage: stage.as_str().to_string(),
            timestamp: Utc::now(),
        });

        Ok(SearchResponse::new(
            session_id,
            SessionStatus::Paused,
            "Search will pause at the next checkpoint",
        ))
    }

    /// Resume a paused session, or a stopped one marked resumable
    ///
    /// Sessions not in memory are restored from the snapshot store.
    pub async fn resume_multi_stage_search(
        &self,
        session_id: &str,
        request: ResumeSearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        let handle = match self.registry.get(session_id).await {
            Some(handle) => handle,
            None => self.restore_session(session_id).await?,
        };
        let replacement = request
            .settings
            .map(|settings| self.prepare_settings(settings))
            .transpose()?;

        let stage = {
            let mut state = handle.state.write().await;
            let progress = &state.progress;
            let resumable = progress.status == SessionStatus::Paused
                || (progress.status == SessionStatus::Stopped && progress.can_resume);
            if !resumable {
                return Err(invalid_state(progress, "resume"));
            }

            let settings = match replacement {
                Some(settings) => settings,
                None => self.prepare_settings(state.settings.clone())?,
            };
            state.settings = settings;

            if let Some(last) = state.progress.last_completed_stage {
                if state.progress.current_stage <= last {
                    state.progress.current_stage = last.next();
                }
            }
            state.progress.mark_resumed();
            state.clock.run();
            state.progress.current_stage
        };
        handle.eta.lock().await.reset_stage_data(stage);

        {
            let mut control = handle.control.lock().await;
            let previous = control.task.take();
            let cancel = CancellationToken::new();
            control.cancel = cancel.clone();
            control.task = Some(self.spawn_pipeline(handle.clone(), cancel, previous));
        }

        info!(session_id = %session_id, stage = %stage, "Search resumed");
        self.event_bus.emit_lossy(ScoutEvent::SearchSessionResumed {
            session_id: session_id.to_string(),
            stage: stage.as_str().to_string(),
            timestamp: Utc::now(),
        });

        Ok(SearchResponse::new(
            session_id,
            SessionStatus::Running,
            "Search resumed",
        ))
    }

    /// Terminal stop; collected data is kept and snapshotted
    pub async fn stop_multi_stage_search(
        &self,
        session_id: &str,
    ) -> Result<SearchResponse, SearchError> {
        let handle = self.handle(session_id).await?;

        let (stage, jobs_collected) = {
            let mut state = handle.state.write().await;
            if !matches!(
                state.progress.status,
                SessionStatus::Running | SessionStatus::Paused
            ) {
                return Err(invalid_state(&state.progress, "stop"));
            }
            state.progress.mark_stopped(false);
            state.clock.pause();
            (state.progress.current_stage, state.progress.jobs_collected)
        };
        handle.control.lock().await.cancel.cancel();

        info!(session_id = %session_id, stage = %stage, jobs_collected, "Search stopped");
        self.persist(&handle).await;
        self.event_bus.emit_lossy(ScoutEvent::SearchSessionStopped {
            session_id: session_id.to_string(),
            stage: stage.as_str().to_string(),
            jobs_collected,
            timestamp: Utc::now(),
        });

        Ok(SearchResponse::new(
            session_id,
            SessionStatus::Stopped,
            "Search stopped",
        ))
    }

    /// Persisted sessions, newest first
    pub async fn get_all_sessions(&self) -> Result<Vec<SnapshotSummary>, SearchError> {
        Ok(self.store.list().await?)
    }

    /// Vacancies of a session, optionally restricted to one status
    pub async fn get_session_vacancies(
        &self,
        session_id: &str,
        status: Option<VacancyStatus>,
    ) -> Result<Vec<Vacancy>, SearchError> {
        let vacancies = match self.registry.get(session_id).await {
            Some(handle) => handle.state.read().await.vacancies.clone(),
            None => {
                self.store
                    .load(session_id)
                    .await?
                    .ok_or_else(|| SearchError::NotFound(session_id.to_string()))?
                    .vacancies
            }
        };

        Ok(match status {
            Some(status) => vacancies.into_iter().filter(|v| v.status == status).collect(),
            None => vacancies,
        })
    }

    /// Stop (if active) and forget a session, snapshot included
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SearchError> {
        let handle = self.registry.remove(session_id).await;

        if let Some(handle) = &handle {
            {
                let mut state = handle.state.write().await;
                if !state.progress.is_terminal() {
                    state.progress.mark_stopped(false);
                }
            }
            let mut control = handle.control.lock().await;
            control.deleted = true;
            control.cancel.cancel();
        }

        let existed = self.store.delete(session_id).await?;
        if handle.is_none() && !existed {
            return Err(SearchError::NotFound(session_id.to_string()));
        }

        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Mark snapshots left running or paused by a dead process as stopped and resumable
    ///
    /// Returns the number of recovered sessions.
    pub async fn recover_interrupted_sessions(&self) -> Result<usize, SearchError> {
        let mut recovered = 0;

        for summary in self.store.list().await? {
            if !matches!(summary.status, SessionStatus::Running | SessionStatus::Paused) {
                continue;
            }
            if self.registry.get(&summary.session_id).await.is_some() {
                continue;
            }
            let Some(mut snapshot) = self.store.load(&summary.session_id).await? else {
                continue;
            };

            snapshot.progress.mark_stopped(true);
            self.store.save(&summary.session_id, snapshot).await?;
            recovered += 1;

            warn!(
                session_id = %summary.session_id,
                stage = %summary.current_stage,
                "Recovered interrupted session, resumable"
            );
        }

        if recovered > 0 {
            info!(recovered, "Interrupted sessions marked resumable");
        }
        Ok(recovered)
    }

    /// Evict finished sessions older than the retention from memory
    pub async fn sweep_finished_sessions(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.session_retention)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let evicted = self.registry.evict_finished(Utc::now() - retention).await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted finished sessions from memory");
        }
        evicted.len()
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    /// Spawn the stage pipeline; a panic inside it fails the session
    ///
    /// `previous` is the task of an earlier run, awaited before anything starts.
    fn spawn_pipeline(
        &self,
        handle: SessionHandle,
        cancel: CancellationToken,
        previous: Option<JoinHandle<()>>,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            let run = {
                let orchestrator = orchestrator.clone();
                let handle = handle.clone();
                tokio::spawn(async move { orchestrator.run_pipeline(&handle, &cancel).await })
            };

            if let Err(join_error) = run.await {
                if join_error.is_panic() {
                    error!(session_id = %handle.session_id, "Search pipeline panicked");
                    orchestrator
                        .fail_session(&handle, "internal error: pipeline panicked".to_string())
                        .await;
                }
            }
        })
    }

    async fn run_pipeline(&self, handle: &SessionHandle, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let stage = {
                let mut state = handle.state.write().await;
                if state.progress.status != SessionStatus::Running {
                    return;
                }
                let stage = state.progress.current_stage;
                if stage == SearchStage::Completed {
                    break;
                }
                let fresh = state
                    .progress
                    .stages
                    .get(stage)
                    .map(|p| p.status == StageStatus::Pending)
                    .unwrap_or(false);
                state.progress.begin_stage(stage);
                if fresh {
                    state.clock.restart();
                } else {
                    state.clock.run();
                }
                stage
            };

            info!(session_id = %handle.session_id, stage = %stage, "Running stage");

            let outcome = match stage {
                SearchStage::Collecting => self.stage_collecting(handle, cancel).await,
                SearchStage::Filtering => self.stage_filtering(handle, cancel).await,
                SearchStage::Enriching => self.stage_enriching(handle, cancel).await,
                SearchStage::Completed => break,
            };

            match outcome {
                Ok(StageOutcome::Completed) => self.finish_stage(handle, stage).await,
                Ok(StageOutcome::Interrupted) => {
                    info!(
                        session_id = %handle.session_id,
                        stage = %stage,
                        "Stage interrupted at checkpoint"
                    );
                    self.persist(handle).await;
                    return;
                }
                Err(e) => {
                    self.fail_session(handle, format!("{:#}", e)).await;
                    return;
                }
            }
        }

        self.complete_session(handle).await;
    }

    async fn finish_stage(&self, handle: &SessionHandle, stage: SearchStage) {
        let next = stage.next();
        let items = {
            let mut state = handle.state.write().await;
            // A stop or failure that landed during the final batch wins over the stage result
            if matches!(
                state.progress.status,
                SessionStatus::Stopped | SessionStatus::Error
            ) {
                drop(state);
                self.persist(handle).await;
                return;
            }
            state.progress.complete_stage(stage);
            state.progress.current_stage = next;
            state.progress.clear_eta();
            state
                .progress
                .stages
                .get(stage)
                .map(|p| p.items_processed)
                .unwrap_or(0)
        };
        handle.eta.lock().await.reset_stage_data(stage);

        info!(session_id = %handle.session_id, stage = %stage, items, "Stage completed");
        self.event_bus.emit_lossy(ScoutEvent::SearchStageChanged {
            session_id: handle.session_id.clone(),
            from_stage: Some(stage.as_str().to_string()),
            to_stage: next.as_str().to_string(),
            timestamp: Utc::now(),
        });
        self.persist(handle).await;
    }

    async fn complete_session(&self, handle: &SessionHandle) {
        let (export, vacancies) = {
            let state = handle.state.read().await;
            if state.progress.status != SessionStatus::Running {
                drop(state);
                self.persist(handle).await;
                return;
            }
            (state.settings.export.clone(), state.vacancies.clone())
        };

        if let Some(export) = export {
            let report = export_vacancies(&export, &vacancies).await;
            if !report.errors.is_empty() {
                let mut state = handle.state.write().await;
                for e in report.errors {
                    state.progress.errors.push(format!("export: {}", e));
                }
            }
        }

        let progress = {
            let mut state = handle.state.write().await;
            if state.progress.status != SessionStatus::Running {
                drop(state);
                self.persist(handle).await;
                return;
            }
            state.progress.mark_completed();
            state.progress.clone()
        };

        info!(
            session_id = %handle.session_id,
            jobs_collected = progress.jobs_collected,
            jobs_filtered = progress.jobs_filtered,
            jobs_enriched = progress.jobs_enriched,
            duration = %scout_common::human_time::format_duration(progress.elapsed_seconds() as f64),
            "Multi-stage search completed"
        );
        self.persist(handle).await;
        self.event_bus.emit_lossy(ScoutEvent::SearchSessionCompleted {
            session_id: handle.session_id.clone(),
            jobs_collected: progress.jobs_collected,
            jobs_filtered: progress.jobs_filtered,
            jobs_enriched: progress.jobs_enriched,
            duration_seconds: progress.elapsed_seconds(),
            timestamp: Utc::now(),
        });
    }

    /// Stage-fatal error: fails the current stage and the session
    async fn fail_session(&self, handle: &SessionHandle, message: String) {
        let stage = {
            let mut state = handle.state.write().await;
            if state.progress.is_terminal() {
                return;
            }
            let stage = state.progress.current_stage;
            state.progress.mark_error(stage, message.clone());
            state.clock.pause();
            stage
        };

        error!(session_id = %handle.session_id, stage = %stage, error = %message, "Search failed");
        self.persist(handle).await;
        self.event_bus.emit_lossy(ScoutEvent::SearchSessionFailed {
            session_id: handle.session_id.clone(),
            stage: stage.as_str().to_string(),
            error: message,
            timestamp: Utc::now(),
        });
    }

    /// Record a throughput sample for `stage` and publish a progress event
    async fn record_tick(&self, handle: &SessionHandle, stage: SearchStage) {
        let (mut progress, elapsed) = {
            let state = handle.state.read().await;
            (state.progress.clone(), state.clock.elapsed_seconds())
        };
        let Some(stage_progress) = progress.stages.get(stage).cloned() else {
            return;
        };

        {
            let mut eta = handle.eta.lock().await;
            eta.record_progress(stage, &stage_progress, elapsed);
            apply_eta(&mut eta, &mut progress);
        }

        self.event_bus.emit_lossy(ScoutEvent::SearchProgressUpdate {
            session_id: handle.session_id.clone(),
            stage: stage.as_str().to_string(),
            items_processed: stage_progress.items_processed,
            items_total: stage_progress.items_total,
            overall_progress: progress.overall_progress,
            eta_seconds: progress.eta_seconds,
            timestamp: Utc::now(),
        });
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn handle(&self, session_id: &str) -> Result<SessionHandle, SearchError> {
        self.registry
            .get(session_id)
            .await
            .ok_or_else(|| SearchError::NotFound(session_id.to_string()))
    }

    async fn restore_session(&self, session_id: &str) -> Result<SessionHandle, SearchError> {
        let snapshot = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| SearchError::NotFound(session_id.to_string()))?;

        info!(
            session_id = %session_id,
            snapshot_version = snapshot.snapshot_version,
            "Restoring session from snapshot"
        );

        let mut state = SessionState::new(snapshot.progress, snapshot.settings);
        state.vacancies = snapshot.vacancies;
        state.checkpoint = snapshot.checkpoint;
        let handle = SessionHandle::new(state, self.config.eta);

        match self.registry.insert(handle.clone()).await {
            Ok(()) => Ok(handle),
            // Restored concurrently by another request
            Err(SessionActive(id)) => self.handle(&id).await,
        }
    }

    /// Validate settings and resolve the API key when enrichment is on
    fn prepare_settings(&self, mut settings: SearchSettings) -> Result<SearchSettings, SearchError> {
        // Trimmed, non-empty and unique, in the order given
        let mut seen = HashSet::new();
        settings.positions = settings
            .positions
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect();
        if settings.positions.is_empty() {
            return Err(SearchError::Validation(
                "at least one search position is required".to_string(),
            ));
        }
        if settings.enabled_sources().is_empty() {
            return Err(SearchError::Validation(
                "at least one source must be enabled".to_string(),
            ));
        }

        if settings.llm.enabled {
            let key = resolve_openai_api_key(
                settings.llm.api_key.as_deref(),
                self.config.toml_api_key.as_deref(),
            )
            .map_err(|e| SearchError::Validation(e.to_string()))?;
            settings.llm.api_key = Some(key);
        }
        Ok(settings)
    }

    /// Save the session snapshot; failures are logged and reported, never raised
    async fn persist(&self, handle: &SessionHandle) -> SaveOutcome {
        let control = handle.control.lock().await;
        if control.deleted {
            return SaveOutcome::failed();
        }

        let snapshot = {
            let state = handle.state.read().await;
            SessionSnapshot::new(
                state.progress.clone(),
                &state.settings,
                state.vacancies.clone(),
                state.checkpoint.clone(),
            )
        };

        let outcome = match self.store.save(&handle.session_id, snapshot).await {
            Ok(outcome) => {
                debug!(
                    session_id = %handle.session_id,
                    snapshot_version = ?outcome.snapshot_version,
                    "Snapshot saved"
                );
                outcome
            }
            Err(e) => {
                warn!(session_id = %handle.session_id, error = %e, "Snapshot save failed");
                SaveOutcome::failed()
            }
        };
        drop(control);
        outcome
    }
}

fn invalid_state(progress: &MultiStageProgress, operation: &'static str) -> SearchError {
    SearchError::InvalidState {
        session_id: progress.session_id.clone(),
        status: progress.status.as_str().to_string(),
        operation,
    }
}

/// Fill the ETA fields of `progress`; cleared when no estimate is available
fn apply_eta(engine: &mut EtaEngine, progress: &mut MultiStageProgress) {
    match engine.calculate_overall_eta(&progress.stages, progress.current_stage) {
        Ok(overall) => {
            progress.eta_seconds = Some(overall.total_eta_seconds);
            progress.eta_confidence = Some(overall.confidence);
            progress.eta_formatted = Some(overall.formatted.clone());
            for calculation in &overall.stages {
                if let Some(stage) = progress.stages.get_mut(calculation.stage) {
                    stage.eta_seconds = Some(calculation.smoothed_eta);
                    stage.eta_confidence = Some(calculation.confidence);
                }
            }
        }
        Err(e) => {
            debug!(session_id = %progress.session_id, reason = %e, "No ETA");
            progress.clear_eta();
        }
    }
}
