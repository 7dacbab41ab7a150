//! COLLECTING stage
//!
//! Runs the collection scheduler against the session's checkpoint. While it
//! runs, a ticker folds the scheduler's counters into the stage progress and
//! every checkpoint the scheduler emits is stored and snapshotted.

use super::{SearchOrchestrator, StageOutcome};
use crate::models::{CollectionCheckpoint, CollectionProgress, SearchStage};
use crate::services::collection::{
    CollectionHooks, CollectionRequest, CollectionScheduler, SharedCollectionProgress,
};
use crate::services::session_registry::SessionHandle;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

impl SearchOrchestrator {
    /// Collect vacancies from every enabled source
    ///
    /// Failed sources are recorded on the stage; they never fail it.
    pub(super) async fn stage_collecting(
        &self,
        handle: &SessionHandle,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let (request, checkpoint) = {
            let state = handle.state.read().await;
            (
                CollectionRequest {
                    session_id: handle.session_id.clone(),
                    settings: state.settings.clone(),
                },
                state.checkpoint.clone(),
            )
        };

        let counters = SharedCollectionProgress::default();
        let (checkpoint_tx, mut checkpoint_rx) = mpsc::unbounded_channel::<CollectionCheckpoint>();
        let hooks = CollectionHooks {
            progress: Some(counters.clone()),
            checkpoints: Some(checkpoint_tx),
            cancel: Some(cancel.clone()),
        };

        let scheduler = CollectionScheduler::new(self.config.collection);
        let collection =
            scheduler.collect_jobs_resumable(self.scrapers.as_slice(), &request, checkpoint, hooks);
        tokio::pin!(collection);

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                result = &mut collection => break result,
                Some(checkpoint) = checkpoint_rx.recv() => {
                    handle.state.write().await.checkpoint = checkpoint;
                    self.persist(handle).await;
                }
                _ = ticker.tick() => {
                    let snapshot = counters.lock().await.clone();
                    self.fold_collection_progress(handle, &snapshot).await;
                }
            }
        };

        let snapshot = counters.lock().await.clone();
        self.fold_collection_progress(handle, &snapshot).await;

        let mut state = handle.state.write().await;
        if result.interrupted {
            state.checkpoint = result.checkpoint;
            return Ok(StageOutcome::Interrupted);
        }

        for error in &result.errors {
            state.progress.add_stage_error(
                SearchStage::Collecting,
                format!(
                    "{}: {} (after {} attempts)",
                    error.source, error.message, error.attempts
                ),
            );
        }
        state.progress.jobs_collected = result.total_collected;
        state.vacancies = result.vacancies;
        state.checkpoint = CollectionCheckpoint::default();

        tracing::info!(
            session_id = %handle.session_id,
            collected = result.total_collected,
            sources = %result.sources_processed.join(", "),
            failed_sources = result.errors.len(),
            "Collection stage finished"
        );

        Ok(StageOutcome::Completed)
    }

    /// Copy scheduler counters into the stage progress and sample the ETA
    ///
    /// Source × position units are the stage's items.
    async fn fold_collection_progress(&self, handle: &SessionHandle, counters: &CollectionProgress) {
        {
            let mut state = handle.state.write().await;
            state.progress.update_stage_items(
                SearchStage::Collecting,
                counters.units_completed,
                counters.units_total,
            );
            state.progress.jobs_collected = counters.jobs_collected;
        }
        self.record_tick(handle, SearchStage::Collecting).await;
    }
}
