//! FILTERING stage
//!
//! Decides every collected vacancy in chunks. A resumed stage only decides the
//! vacancies still `collected`; vacancies kept earlier seed duplicate detection.

use super::{SearchOrchestrator, StageOutcome};
use crate::models::{SearchStage, VacancyStatus};
use crate::services::filtering::{FilterDecision, FilterEngine};
use crate::services::session_registry::SessionHandle;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

impl SearchOrchestrator {
    pub(super) async fn stage_filtering(
        &self,
        handle: &SessionHandle,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let (mut engine, pending, total) = {
            let state = handle.state.read().await;
            let mut engine = FilterEngine::new(&state.settings.filters);
            let mut pending = Vec::new();
            for (index, vacancy) in state.vacancies.iter().enumerate() {
                match vacancy.status {
                    VacancyStatus::Collected => pending.push(index),
                    VacancyStatus::Filtered | VacancyStatus::Enriched => engine.remember(vacancy),
                    VacancyStatus::Skipped => {}
                }
            }
            (engine, pending, state.vacancies.len())
        };

        let mut processed = total - pending.len();
        {
            let mut state = handle.state.write().await;
            state
                .progress
                .update_stage_items(SearchStage::Filtering, processed, total);
        }

        tracing::info!(
            session_id = %handle.session_id,
            total,
            pending = pending.len(),
            "Filtering vacancies"
        );

        for chunk in pending.chunks(self.config.filter_chunk_size.max(1)) {
            if cancel.is_cancelled() {
                return Ok(StageOutcome::Interrupted);
            }

            {
                let mut state = handle.state.write().await;
                for &index in chunk {
                    let Some(vacancy) = state.vacancies.get_mut(index) else {
                        continue;
                    };
                    match engine.evaluate(vacancy) {
                        FilterDecision::Keep => vacancy.mark_filtered(),
                        FilterDecision::Skip(reason) => {
                            tracing::debug!(
                                session_id = %handle.session_id,
                                title = %vacancy.title,
                                reason = %reason,
                                "Vacancy skipped"
                            );
                            vacancy.mark_skipped(reason);
                        }
                    }
                }
                processed += chunk.len();

                let kept = state
                    .vacancies
                    .iter()
                    .filter(|v| matches!(v.status, VacancyStatus::Filtered | VacancyStatus::Enriched))
                    .count();
                let skipped = state
                    .vacancies
                    .iter()
                    .filter(|v| v.status == VacancyStatus::Skipped)
                    .count();
                state.progress.jobs_filtered = kept;
                state.progress.jobs_skipped = skipped;
                state
                    .progress
                    .update_stage_items(SearchStage::Filtering, processed, total);
            }

            self.record_tick(handle, SearchStage::Filtering).await;
            tokio::task::yield_now().await;
        }

        let progress = handle.progress().await;
        tracing::info!(
            session_id = %handle.session_id,
            kept = progress.jobs_filtered,
            skipped = progress.jobs_skipped,
            "Filtering stage finished"
        );

        Ok(StageOutcome::Completed)
    }
}
