//! Collection scheduler
//!
//! Fans one collection stage out across enabled sources × search positions:
//! - sources run in batches of `max_concurrent_sources`
//! - within a source, positions run in batches of `max_concurrent_positions`
//! - each source is retried with exponential backoff; positions finished by an
//!   earlier attempt are never scraped again
//! - a source that exhausts its retries is recorded once and its jobs dropped;
//!   the remaining sources are unaffected
//! - jobs are counted when their source completes, so the live counter only grows
//!
//! Cancellation is cooperative: the token is checked at batch boundaries and
//! during backoff sleeps. An interrupted run returns its checkpoint so a later
//! run can continue where this one stopped.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scout_common::config::CollectionTuning;

use super::scraper::{JobPost, ScraperError, ScraperInput, SharedScraper};
use crate::models::{
    CollectionCheckpoint, CollectionProgress, CollectionResult, SearchSettings, SourceCheckpoint,
    SourceError, SourceState, Vacancy, VacancyStatus,
};
use crate::utils::RetryPolicy;

/// Progress shared between the scheduler and its observers
pub type SharedCollectionProgress = Arc<Mutex<CollectionProgress>>;

/// Scheduler tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Sources scraped at the same time (default: 2)
    pub max_concurrent_sources: usize,
    /// Positions of one source scraped at the same time (default: 3)
    pub max_concurrent_positions: usize,
    /// Additional attempts per source after the first (default: 3)
    pub max_retries: u32,
    /// First backoff delay, doubled per retry (default: 1000ms)
    pub base_retry_delay_ms: u64,
    /// Courtesy delay between position batches (default: 500ms)
    pub inter_request_delay_ms: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 2,
            max_concurrent_positions: 3,
            max_retries: 3,
            base_retry_delay_ms: 1000,
            inter_request_delay_ms: 500,
        }
    }
}

impl CollectionConfig {
    /// Defaults overridden by the TOML `[collection]` section
    pub fn from_tuning(tuning: &CollectionTuning) -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_sources: tuning
                .max_concurrent_sources
                .unwrap_or(defaults.max_concurrent_sources)
                .max(1),
            max_concurrent_positions: tuning
                .max_concurrent_positions
                .unwrap_or(defaults.max_concurrent_positions)
                .max(1),
            max_retries: tuning.max_retries.unwrap_or(defaults.max_retries),
            base_retry_delay_ms: tuning
                .base_retry_delay_ms
                .unwrap_or(defaults.base_retry_delay_ms),
            inter_request_delay_ms: tuning
                .inter_request_delay_ms
                .unwrap_or(defaults.inter_request_delay_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_retry_delay_ms)
    }
}

/// What to collect
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub session_id: String,
    pub settings: SearchSettings,
}

/// Optional hooks of a resumable run
#[derive(Default)]
pub struct CollectionHooks {
    /// Receives live counters
    pub progress: Option<SharedCollectionProgress>,
    /// Receives the checkpoint after every source batch
    pub checkpoints: Option<mpsc::UnboundedSender<CollectionCheckpoint>>,
    /// Stops the run at the next batch boundary
    pub cancel: Option<CancellationToken>,
}

/// How one attempt over a source's remaining positions ended
enum AttemptOutcome {
    Finished,
    Interrupted,
}

/// Bounded-concurrency collection across sources and positions
#[derive(Debug, Clone, Default)]
pub struct CollectionScheduler {
    config: CollectionConfig,
}

impl CollectionScheduler {
    pub fn new(config: CollectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Collect from scratch without observers
    pub async fn collect_jobs(
        &self,
        scrapers: &[SharedScraper],
        request: &CollectionRequest,
    ) -> CollectionResult {
        self.collect_jobs_resumable(
            scrapers,
            request,
            CollectionCheckpoint::default(),
            CollectionHooks::default(),
        )
        .await
    }

    /// Collect, continuing from `checkpoint`
    pub async fn collect_jobs_resumable(
        &self,
        scrapers: &[SharedScraper],
        request: &CollectionRequest,
        mut checkpoint: CollectionCheckpoint,
        hooks: CollectionHooks,
    ) -> CollectionResult {
        let progress = hooks.progress.unwrap_or_default();
        let cancel = hooks.cancel.unwrap_or_default();
        let positions = &request.settings.positions;

        let candidates = candidate_sources(scrapers, &request.settings);
        if candidates.is_empty() {
            tracing::warn!(
                session_id = %request.session_id,
                "No enabled source has a registered scraper"
            );
        }

        {
            let mut p = progress.lock().await;
            *p = initial_progress(&candidates, positions, &checkpoint);
        }

        tracing::info!(
            session_id = %request.session_id,
            sources = candidates.len(),
            positions = positions.len(),
            resumed_units = checkpoint.completed_units(),
            "Starting collection"
        );

        let mut interrupted = false;

        for batch in candidates.chunks(self.config.max_concurrent_sources.max(1)) {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            let work: Vec<_> = batch
                .iter()
                .filter(|scraper| {
                    !checkpoint
                        .sources
                        .get(scraper.name())
                        .map(SourceCheckpoint::is_finished)
                        .unwrap_or(false)
                })
                .map(|scraper| {
                    let state = checkpoint
                        .sources
                        .get(scraper.name())
                        .cloned()
                        .unwrap_or_default();
                    self.collect_source(scraper, request, state, &progress, &cancel)
                })
                .collect();

            for (name, state, source_interrupted) in join_all(work).await {
                interrupted |= source_interrupted;
                checkpoint.sources.insert(name, state);
            }

            if let Some(tx) = &hooks.checkpoints {
                let _ = tx.send(checkpoint.clone());
            }

            if interrupted {
                break;
            }
        }

        let result = build_result(&candidates, checkpoint, interrupted);

        {
            let mut p = progress.lock().await;
            p.current_source = None;
            p.is_complete = !interrupted;
        }

        if result.interrupted {
            tracing::info!(
                session_id = %request.session_id,
                collected = result.total_collected,
                "Collection interrupted at checkpoint"
            );
        } else {
            tracing::info!(
                session_id = %request.session_id,
                collected = result.total_collected,
                sources_ok = result.sources_processed.len(),
                sources_failed = result.errors.len(),
                "Collection finished"
            );
        }

        result
    }

    /// Scrape one source with retry; returns (name, final state, interrupted)
    async fn collect_source(
        &self,
        scraper: &SharedScraper,
        request: &CollectionRequest,
        mut state: SourceCheckpoint,
        progress: &SharedCollectionProgress,
        cancel: &CancellationToken,
    ) -> (String, SourceCheckpoint, bool) {
        let name = scraper.name().to_string();
        let positions = &request.settings.positions;

        progress.lock().await.current_source = Some(name.clone());

        if !scraper.check_availability().await {
            tracing::warn!(session_id = %request.session_id, source = %name, "Source unavailable, skipping");
            self.fail_source(&name, &mut state, positions, "source unavailable", 0, progress)
                .await;
            return (name, state, false);
        }

        let policy = self.config.retry_policy();
        let mut last_error = String::new();

        for attempt in 0..policy.max_attempts() {
            if attempt > 0 {
                let delay = policy.delay(attempt - 1);
                tracing::warn!(
                    session_id = %request.session_id,
                    source = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Retrying source after backoff"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return (name, state, true),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self
                .scrape_remaining_positions(scraper, request, &mut state, progress, cancel)
                .await
            {
                Ok(AttemptOutcome::Finished) => {
                    state.state = SourceState::Completed;
                    {
                        // Jobs count once their source has completed
                        let mut p = progress.lock().await;
                        p.sources_completed += 1;
                        p.jobs_collected += state.vacancies.len();
                    }
                    tracing::info!(
                        session_id = %request.session_id,
                        source = %name,
                        jobs = state.vacancies.len(),
                        "Source completed"
                    );
                    return (name, state, false);
                }
                Ok(AttemptOutcome::Interrupted) => return (name, state, true),
                Err(e) => last_error = e.to_string(),
            }
        }

        tracing::error!(
            session_id = %request.session_id,
            source = %name,
            attempts = policy.max_attempts(),
            error = %last_error,
            "Source failed after all retries"
        );
        self.fail_source(
            &name,
            &mut state,
            positions,
            &last_error,
            policy.max_attempts(),
            progress,
        )
        .await;
        (name, state, false)
    }

    /// One attempt over the positions this source has not finished yet
    async fn scrape_remaining_positions(
        &self,
        scraper: &SharedScraper,
        request: &CollectionRequest,
        state: &mut SourceCheckpoint,
        progress: &SharedCollectionProgress,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, ScraperError> {
        let remaining: Vec<&String> = request
            .settings
            .positions
            .iter()
            .filter(|p| !state.completed_positions.contains(*p))
            .collect();

        for (index, batch) in remaining
            .chunks(self.config.max_concurrent_positions.max(1))
            .enumerate()
        {
            if cancel.is_cancelled() {
                return Ok(AttemptOutcome::Interrupted);
            }
            if index > 0 && self.config.inter_request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_request_delay_ms)).await;
            }

            let calls = batch.iter().map(|position| {
                let input = build_input(position, &request.settings);
                async move { (*position, scraper.scrape(&input).await) }
            });

            let mut first_error = None;
            for (position, outcome) in join_all(calls).await {
                match outcome {
                    Ok(output) => {
                        let vacancies =
                            convert_jobs(&output.jobs, request, scraper.name(), position);
                        if output.jobs.is_empty() {
                            tracing::info!(
                                session_id = %request.session_id,
                                source = scraper.name(),
                                position = %position,
                                "Scraper returned no jobs"
                            );
                        }

                        progress.lock().await.units_completed += 1;

                        state.vacancies.extend(vacancies);
                        state.completed_positions.insert(position.clone());
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %request.session_id,
                            source = scraper.name(),
                            position = %position,
                            error = %e,
                            "Position scrape failed"
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(AttemptOutcome::Finished)
    }

    async fn fail_source(
        &self,
        name: &str,
        state: &mut SourceCheckpoint,
        positions: &[String],
        error: &str,
        attempts: u32,
        progress: &SharedCollectionProgress,
    ) {
        let unfinished = positions
            .iter()
            .filter(|p| !state.completed_positions.contains(*p))
            .count();

        state.state = SourceState::Failed {
            error: error.to_string(),
            attempts,
        };

        let mut p = progress.lock().await;
        p.sources_completed += 1;
        p.units_completed += unfinished;
        p.errors.push(format!("{}: {}", name, error));
    }
}

/// Enabled sources that have a scraper, in settings order
fn candidate_sources(scrapers: &[SharedScraper], settings: &SearchSettings) -> Vec<SharedScraper> {
    let by_name: BTreeMap<&str, &SharedScraper> =
        scrapers.iter().map(|s| (s.name(), s)).collect();
    settings
        .enabled_sources()
        .iter()
        .filter_map(|name| by_name.get(name.as_str()).map(|s| Arc::clone(s)))
        .collect()
}

fn initial_progress(
    candidates: &[SharedScraper],
    positions: &[String],
    checkpoint: &CollectionCheckpoint,
) -> CollectionProgress {
    let mut progress = CollectionProgress {
        total_sources: candidates.len(),
        units_total: candidates.len() * positions.len(),
        ..Default::default()
    };

    for scraper in candidates {
        let Some(state) = checkpoint.sources.get(scraper.name()) else {
            continue;
        };
        let done = positions
            .iter()
            .filter(|p| state.completed_positions.contains(*p))
            .count();
        match &state.state {
            SourceState::Failed { error, .. } => {
                progress.sources_completed += 1;
                progress.units_completed += positions.len();
                progress.errors.push(format!("{}: {}", scraper.name(), error));
            }
            SourceState::Completed => {
                progress.sources_completed += 1;
                progress.units_completed += positions.len();
                progress.jobs_collected += state.vacancies.len();
            }
            SourceState::InProgress => progress.units_completed += done,
        }
    }

    progress
}

fn build_result(
    candidates: &[SharedScraper],
    checkpoint: CollectionCheckpoint,
    interrupted: bool,
) -> CollectionResult {
    let mut vacancies = Vec::new();
    let mut sources_processed = Vec::new();
    let mut errors = Vec::new();

    for scraper in candidates {
        let Some(state) = checkpoint.sources.get(scraper.name()) else {
            continue;
        };
        match &state.state {
            SourceState::Completed => {
                sources_processed.push(scraper.name().to_string());
                vacancies.extend(state.vacancies.iter().cloned());
            }
            SourceState::Failed { error, attempts } => errors.push(SourceError {
                source: scraper.name().to_string(),
                message: error.clone(),
                attempts: *attempts,
            }),
            SourceState::InProgress => {}
        }
    }

    CollectionResult {
        success: errors.is_empty(),
        total_collected: vacancies.len(),
        vacancies,
        sources_processed,
        errors,
        interrupted,
        checkpoint,
    }
}

/// Scraper input for one position
///
/// Only the first configured country is passed as location and country hint.
fn build_input(position: &str, settings: &SearchSettings) -> ScraperInput {
    let country = settings.location_hint().map(str::to_string);
    ScraperInput {
        search_term: position.to_string(),
        location: country.clone(),
        country,
        is_remote: Some(true),
        results_wanted: settings.results_wanted,
        job_type: None,
        hours_old: settings.hours_old,
        easy_apply: None,
        description_format: Some("markdown".to_string()),
    }
}

fn convert_jobs(
    jobs: &[serde_json::Value],
    request: &CollectionRequest,
    source: &str,
    position: &str,
) -> Vec<Vacancy> {
    let mut skipped = 0usize;
    let vacancies: Vec<Vacancy> = jobs
        .iter()
        .filter_map(|value| {
            let job = JobPost::from_value(value);
            if job.is_none() {
                skipped += 1;
            }
            job
        })
        .map(|job| {
            let now = Utc::now();
            Vacancy {
                id: Uuid::new_v4(),
                session_id: request.session_id.clone(),
                title: job.title,
                company: job.company,
                description: job.description,
                url: job.url,
                source: source.to_string(),
                search_position: position.to_string(),
                country: job.country,
                location: job.location,
                status: VacancyStatus::Collected,
                skip_reason: None,
                data: job.data,
                enrichment: None,
                created_at: now,
                updated_at: now,
            }
        })
        .collect();

    if skipped > 0 {
        tracing::warn!(
            session_id = %request.session_id,
            source,
            position,
            skipped,
            "Skipped malformed job entries"
        );
    }
    vacancies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_input_uses_first_country_only() {
        let mut settings = SearchSettings::default();
        settings.filters.countries = vec!["Ukraine".to_string(), "Latvia".to_string()];

        let input = build_input("devops", &settings);
        assert_eq!(input.location.as_deref(), Some("Ukraine"));
        assert_eq!(input.country.as_deref(), Some("Ukraine"));
        assert_eq!(input.is_remote, Some(true));
        assert_eq!(input.results_wanted, 100);
        assert_eq!(input.hours_old, Some(168));
        assert_eq!(input.description_format.as_deref(), Some("markdown"));
    }

    #[test]
    fn test_config_from_tuning() {
        let tuning = CollectionTuning {
            max_concurrent_sources: Some(0),
            max_retries: Some(1),
            ..Default::default()
        };
        let config = CollectionConfig::from_tuning(&tuning);
        assert_eq!(config.max_concurrent_sources, 1);
        assert_eq!(config.max_concurrent_positions, 3);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.base_retry_delay_ms, 1000);
    }

    #[test]
    fn test_convert_skips_malformed() {
        let request = CollectionRequest {
            session_id: "s1".to_string(),
            settings: SearchSettings::default(),
        };
        let jobs = vec![
            serde_json::json!({"title": "SRE", "job_url": "https://a"}),
            serde_json::json!({"title": "missing url"}),
        ];
        let vacancies = convert_jobs(&jobs, &request, "indeed", "sre");
        assert_eq!(vacancies.len(), 1);
        assert_eq!(vacancies[0].source, "indeed");
        assert_eq!(vacancies[0].search_position, "sre");
        assert_eq!(vacancies[0].status, VacancyStatus::Collected);
    }
}
