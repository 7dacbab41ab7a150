//! ENRICHING stage
//!
//! Sends filtered vacancies to the LLM in batches of `max_concurrent_requests`.
//! A failed vacancy stays `filtered` and the error is recorded on the stage;
//! authentication and configuration errors fail the stage.

use super::{SearchOrchestrator, StageOutcome};
use crate::models::{SearchStage, Vacancy, VacancyStatus};
use crate::services::enrichment::{accumulate_usage, Enricher};
use crate::services::session_registry::SessionHandle;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

impl SearchOrchestrator {
    pub(super) async fn stage_enriching(
        &self,
        handle: &SessionHandle,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let (llm, pending, already_enriched) = {
            let state = handle.state.read().await;
            let pending: Vec<usize> = state
                .vacancies
                .iter()
                .enumerate()
                .filter(|(_, v)| v.status == VacancyStatus::Filtered)
                .map(|(index, _)| index)
                .collect();
            let already_enriched = state
                .vacancies
                .iter()
                .filter(|v| v.status == VacancyStatus::Enriched)
                .count();
            (state.settings.llm.clone(), pending, already_enriched)
        };

        if !llm.enabled {
            tracing::info!(session_id = %handle.session_id, "Enrichment disabled, skipping stage");
            let mut state = handle.state.write().await;
            state.progress.update_stage_items(SearchStage::Enriching, 0, 0);
            return Ok(StageOutcome::Completed);
        }

        let api_key = llm
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("OpenAI API key not configured"))?;
        let client = self.llm_factory.create(&api_key)?;
        let enricher = Enricher::new(&llm);

        let total = pending.len() + already_enriched;
        let mut processed = already_enriched;
        {
            let mut state = handle.state.write().await;
            state
                .progress
                .update_stage_items(SearchStage::Enriching, processed, total);
        }

        tracing::info!(
            session_id = %handle.session_id,
            model = %llm.model,
            pending = pending.len(),
            "Enriching vacancies"
        );

        for batch in pending.chunks(self.config.max_concurrent_requests.max(1)) {
            if cancel.is_cancelled() {
                return Ok(StageOutcome::Interrupted);
            }

            let vacancies: Vec<(usize, Vacancy)> = {
                let state = handle.state.read().await;
                batch
                    .iter()
                    .filter_map(|&index| state.vacancies.get(index).map(|v| (index, v.clone())))
                    .collect()
            };

            let results = join_all(vacancies.iter().map(|(index, vacancy)| {
                let enricher = &enricher;
                let client = client.as_ref();
                async move { (*index, enricher.enrich(client, vacancy).await) }
            }))
            .await;

            let mut fatal = None;
            {
                let mut state = handle.state.write().await;
                for (index, result) in results {
                    match result {
                        Ok((fields, usage)) => {
                            accumulate_usage(&mut state.progress.llm_usage, &llm.model, &usage);
                            if let Some(vacancy) = state.vacancies.get_mut(index) {
                                vacancy.apply_enrichment(fields);
                            }
                        }
                        Err(e) if e.is_fatal() => {
                            fatal.get_or_insert(e);
                        }
                        Err(e) => {
                            let title = state
                                .vacancies
                                .get(index)
                                .map(|v| v.title.clone())
                                .unwrap_or_default();
                            tracing::warn!(
                                session_id = %handle.session_id,
                                title = %title,
                                error = %e,
                                "Enrichment failed, vacancy kept as filtered"
                            );
                            state
                                .progress
                                .add_stage_error(SearchStage::Enriching, format!("{}: {}", title, e));
                        }
                    }
                }

                processed += batch.len();
                state.progress.jobs_enriched = state
                    .vacancies
                    .iter()
                    .filter(|v| v.status == VacancyStatus::Enriched)
                    .count();
                state
                    .progress
                    .update_stage_items(SearchStage::Enriching, processed, total);
            }

            if let Some(e) = fatal {
                return Err(anyhow!(e).context("LLM enrichment aborted"));
            }

            self.record_tick(handle, SearchStage::Enriching).await;
        }

        let usage = handle.progress().await.llm_usage;
        tracing::info!(
            session_id = %handle.session_id,
            requests = usage.requests,
            tokens = usage.total_tokens(),
            cost_usd = usage.estimated_cost_usd,
            "Enrichment stage finished"
        );

        Ok(StageOutcome::Completed)
    }
}
