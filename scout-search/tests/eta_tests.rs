//! ETA engine estimates from throughput samples

use scout_search::models::{SearchStage, StageProgress, StageSet, StageStatus};
use scout_search::services::{EtaConfig, EtaEngine, EtaError};

fn progress(processed: usize, total: usize) -> StageProgress {
    let mut p = StageProgress::default();
    p.set_items(processed, total);
    p
}

#[test]
fn test_steady_fifty_per_minute() {
    let mut engine = EtaEngine::new(EtaConfig::default());

    // 50 items/minute throughout
    for (processed, elapsed) in [(10, 12.0), (30, 36.0), (50, 60.0)] {
        assert!(engine.record_progress(SearchStage::Collecting, &progress(processed, 100), elapsed));
    }

    let eta = engine
        .calculate_stage_eta(SearchStage::Collecting, &progress(50, 100))
        .expect("three samples are enough");
    assert_eq!(eta.remaining_items, 50);
    assert!((eta.current_speed - 50.0).abs() < 1e-9);
    assert!((eta.raw_eta - 60.0).abs() < 1e-9);
    assert!(eta.confidence > 0.5, "confidence {}", eta.confidence);
}

#[test]
fn test_overall_eta_after_stage_rerun_uses_fresh_samples() {
    let mut engine = EtaEngine::new(EtaConfig::default());
    for (processed, elapsed) in [(10, 60.0), (20, 120.0), (30, 180.0)] {
        engine.record_progress(SearchStage::Filtering, &progress(processed, 100), elapsed);
    }

    let mut stages = StageSet::default();
    stages.collecting.status = StageStatus::Completed;
    stages.filtering = progress(30, 100);
    stages.filtering.status = StageStatus::Running;

    let overall = engine
        .calculate_overall_eta(&stages, SearchStage::Filtering)
        .expect("filtering has samples");
    assert_eq!(overall.total_remaining_items, 70);
    assert!((overall.total_eta_seconds - 420.0).abs() < 1e-6);
    assert!(!overall.formatted.is_empty());

    // Rerun after resume: the old samples must not be used
    engine.reset_stage_data(SearchStage::Filtering);
    assert!(matches!(
        engine.calculate_overall_eta(&stages, SearchStage::Filtering),
        Err(EtaError::InsufficientData(SearchStage::Filtering))
    ));
}
