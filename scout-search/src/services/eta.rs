//! Speed and ETA estimation for multi-stage sessions
//!
//! Raw `(items processed, elapsed time)` samples are noisy: scrapers return in
//! bursts and LLM latency varies per request. The engine keeps a bounded
//! history of throughput samples per stage and turns it into a smoothed,
//! confidence-scored time-to-completion.
//!
//! **Per stage:**
//! 1. `record_progress` appends a speed sample (items/minute), FIFO-trimmed
//! 2. `calculate_stage_eta` smooths the speed over history (newest to oldest),
//!    derives a raw ETA, then damps it against the previous estimate
//! 3. `calculate_overall_eta` sums the current and pending stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::models::{SearchStage, StageProgress, StageSet, StageStatus};

/// ETA engine tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaConfig {
    /// Samples kept per stage (default: 10)
    pub max_history: usize,
    /// Samples required before any estimate is produced (default: 3)
    pub minimum_data_points: usize,
    /// Exponential smoothing factor α (default: 0.2)
    pub smoothing_factor: f64,
    /// Samples slower than this (items/minute) are discarded (default: 0.1)
    pub minimum_speed: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            minimum_data_points: 3,
            smoothing_factor: 0.2,
            minimum_speed: 0.1,
        }
    }
}

/// One throughput sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedDataPoint {
    pub timestamp: DateTime<Utc>,
    pub items_processed: usize,
    pub time_elapsed_seconds: f64,
    pub speed_items_per_minute: f64,
}

/// Estimate for a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEtaCalculation {
    pub stage: SearchStage,
    /// Smoothed speed (items/minute)
    pub current_speed: f64,
    pub remaining_items: usize,
    pub raw_eta: f64,
    pub smoothed_eta: f64,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub last_update: DateTime<Utc>,
}

/// Estimate across the current and pending stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallEtaCalculation {
    pub total_remaining_items: usize,
    pub total_eta_seconds: f64,
    pub confidence: f64,
    pub stages: Vec<StageEtaCalculation>,
    pub formatted: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum EtaError {
    #[error("not enough samples to estimate {0}")]
    InsufficientData(SearchStage),

    #[error("non-finite estimate for {0}")]
    NonFinite(SearchStage),
}

/// Per-session ETA engine
///
/// Owned by one session; stages of a session run sequentially so the history
/// maps are never written by two stages at once.
#[derive(Debug, Default)]
pub struct EtaEngine {
    config: EtaConfig,
    history: HashMap<SearchStage, VecDeque<SpeedDataPoint>>,
    last_calculations: HashMap<SearchStage, StageEtaCalculation>,
}

impl EtaEngine {
    pub fn new(config: EtaConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
            last_calculations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EtaConfig {
        &self.config
    }

    /// Append a throughput sample; returns whether it was kept
    ///
    /// Samples with no elapsed time, no processed items, or a speed below the
    /// minimum are discarded without touching the history.
    pub fn record_progress(
        &mut self,
        stage: SearchStage,
        progress: &StageProgress,
        elapsed_seconds: f64,
    ) -> bool {
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 || progress.items_processed == 0
        {
            return false;
        }

        let speed = progress.items_processed as f64 / elapsed_seconds * 60.0;
        if speed < self.config.minimum_speed {
            return false;
        }

        let history = self.history.entry(stage).or_default();
        history.push_back(SpeedDataPoint {
            timestamp: Utc::now(),
            items_processed: progress.items_processed,
            time_elapsed_seconds: elapsed_seconds,
            speed_items_per_minute: speed,
        });
        while history.len() > self.config.max_history {
            history.pop_front();
        }
        true
    }

    /// Samples currently held for a stage
    pub fn history(&self, stage: SearchStage) -> Vec<SpeedDataPoint> {
        self.history
            .get(&stage)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Estimate the remaining time of one stage
    ///
    /// Returns `None` until `minimum_data_points` samples exist. The result is
    /// cached and feeds the smoothing of the next call.
    pub fn calculate_stage_eta(
        &mut self,
        stage: SearchStage,
        progress: &StageProgress,
    ) -> Option<StageEtaCalculation> {
        let history = self.history.get(&stage)?;
        if history.len() < self.config.minimum_data_points {
            return None;
        }

        let remaining_items = progress.items_total.saturating_sub(progress.items_processed);
        let now = Utc::now();

        if remaining_items == 0 {
            let done = StageEtaCalculation {
                stage,
                current_speed: history
                    .back()
                    .map(|p| p.speed_items_per_minute)
                    .unwrap_or(0.0),
                remaining_items: 0,
                raw_eta: 0.0,
                smoothed_eta: 0.0,
                confidence: 1.0,
                last_update: now,
            };
            self.last_calculations.insert(stage, done.clone());
            return Some(done);
        }

        let alpha = self.config.smoothing_factor;
        let current_speed = smoothed_speed(history, alpha)?;
        if current_speed <= 0.0 {
            return None;
        }

        let raw_eta = remaining_items as f64 / current_speed * 60.0;
        let smoothed_eta = match self.last_calculations.get(&stage) {
            Some(previous) => alpha * raw_eta + (1.0 - alpha) * previous.smoothed_eta,
            None => raw_eta,
        };
        let confidence = self.confidence(history, current_speed);

        let calculation = StageEtaCalculation {
            stage,
            current_speed,
            remaining_items,
            raw_eta,
            smoothed_eta,
            confidence,
            last_update: now,
        };
        self.last_calculations.insert(stage, calculation.clone());
        Some(calculation)
    }

    /// Estimate the remaining time of the whole session
    ///
    /// Completed stages contribute zero time at full confidence; the current
    /// stage and pending stages contribute their own estimates when available.
    pub fn calculate_overall_eta(
        &mut self,
        stages: &StageSet,
        current_stage: SearchStage,
    ) -> Result<OverallEtaCalculation, EtaError> {
        let mut total_remaining_items = 0usize;
        let mut total_eta_seconds = 0.0;
        let mut confidences = Vec::new();
        let mut calculations = Vec::new();
        let mut current_estimated = false;

        for (stage, progress) in stages.iter() {
            let finished = progress.status == StageStatus::Completed || stage < current_stage;
            if finished {
                confidences.push(1.0);
                continue;
            }

            total_remaining_items +=
                progress.items_total.saturating_sub(progress.items_processed);

            if let Some(calc) = self.calculate_stage_eta(stage, progress) {
                if !calc.smoothed_eta.is_finite() || !calc.confidence.is_finite() {
                    return Err(EtaError::NonFinite(stage));
                }
                total_eta_seconds += calc.smoothed_eta;
                confidences.push(calc.confidence);
                if stage == current_stage {
                    current_estimated = true;
                }
                calculations.push(calc);
            }
        }

        if !current_estimated && current_stage != SearchStage::Completed {
            return Err(EtaError::InsufficientData(current_stage));
        }

        let confidence = if confidences.is_empty() {
            1.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Ok(OverallEtaCalculation {
            total_remaining_items,
            total_eta_seconds,
            confidence,
            stages: calculations,
            formatted: format_eta(total_eta_seconds),
        })
    }

    /// Forget samples and cached estimates of one stage
    pub fn reset_stage_data(&mut self, stage: SearchStage) {
        self.history.remove(&stage);
        self.last_calculations.remove(&stage);
    }

    /// Forget everything
    pub fn reset_all_data(&mut self) {
        self.history.clear();
        self.last_calculations.clear();
    }

    /// Confidence from speed variance and history length
    fn confidence(&self, history: &VecDeque<SpeedDataPoint>, current_speed: f64) -> f64 {
        let speeds: Vec<f64> = history.iter().map(|p| p.speed_items_per_minute).collect();
        let n = speeds.len() as f64;
        let mean = speeds.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.1;
        }

        let variance = speeds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let coefficient_of_variation = variance.sqrt() / mean;
        let mut confidence = (1.0 - coefficient_of_variation).clamp(0.1, 1.0);

        let extra = speeds.len().saturating_sub(self.config.minimum_data_points);
        confidence += (extra as f64 * 0.1).min(0.3);

        if (current_speed - mean).abs() / mean > 0.5 {
            confidence *= 0.7;
        }

        confidence.clamp(0.0, 1.0)
    }
}

/// Exponential smoothing newest → oldest
fn smoothed_speed(history: &VecDeque<SpeedDataPoint>, alpha: f64) -> Option<f64> {
    let mut samples = history.iter().rev();
    let mut smoothed = samples.next()?.speed_items_per_minute;
    for point in samples {
        smoothed = alpha * point.speed_items_per_minute + (1.0 - alpha) * smoothed;
    }
    Some(smoothed)
}

/// Human-readable ETA (`"45s"`, `"2m 5s"`, `"1h 2m"`)
pub fn format_eta(seconds: f64) -> String {
    scout_common::human_time::format_duration(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(processed: usize, total: usize) -> StageProgress {
        let mut p = StageProgress::default();
        p.set_items(processed, total);
        p
    }

    #[test]
    fn test_discards_invalid_samples() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Collecting;

        assert!(!engine.record_progress(stage, &progress(10, 100), 0.0));
        assert!(!engine.record_progress(stage, &progress(10, 100), -1.0));
        assert!(!engine.record_progress(stage, &progress(0, 100), 30.0));
        // 1 item in 20 minutes is below 0.1/min
        assert!(!engine.record_progress(stage, &progress(1, 100), 1200.0));
        assert!(engine.history(stage).is_empty());
    }

    #[test]
    fn test_history_is_fifo_bounded() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Enriching;
        for i in 1..=15 {
            assert!(engine.record_progress(stage, &progress(i, 100), i as f64));
        }
        let history = engine.history(stage);
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].items_processed, 6);
        assert_eq!(history[9].items_processed, 15);
    }

    #[test]
    fn test_no_estimate_below_minimum_samples() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Filtering;
        engine.record_progress(stage, &progress(10, 100), 10.0);
        engine.record_progress(stage, &progress(20, 100), 20.0);
        assert!(engine.calculate_stage_eta(stage, &progress(20, 100)).is_none());
        assert!(engine
            .calculate_stage_eta(SearchStage::Collecting, &progress(20, 100))
            .is_none());
    }

    #[test]
    fn test_zero_remaining_is_immediate() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Collecting;
        for i in 1..=3 {
            engine.record_progress(stage, &progress(i * 10, 30), i as f64 * 10.0);
        }
        let calc = engine.calculate_stage_eta(stage, &progress(30, 30)).unwrap();
        assert_eq!(calc.remaining_items, 0);
        assert_eq!(calc.smoothed_eta, 0.0);
        assert_eq!(calc.confidence, 1.0);
    }

    #[test]
    fn test_speed_smoothing_weights_newest_sample() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Collecting;
        // speeds: 60, 60, 120 items/min (oldest → newest)
        engine.record_progress(stage, &progress(10, 1000), 10.0);
        engine.record_progress(stage, &progress(20, 1000), 20.0);
        engine.record_progress(stage, &progress(60, 1000), 30.0);

        let calc = engine.calculate_stage_eta(stage, &progress(60, 1000)).unwrap();
        // 120 → 0.2*60 + 0.8*120 = 108 → 0.2*60 + 0.8*108 = 98.4
        assert!((calc.current_speed - 98.4).abs() < 1e-9);
        assert!((calc.raw_eta - 940.0 / 98.4 * 60.0).abs() < 1e-9);
        assert_eq!(calc.raw_eta, calc.smoothed_eta);
    }

    #[test]
    fn test_smoothed_eta_damps_against_previous() {
        let mut engine = EtaEngine::default();
        let stage = SearchStage::Collecting;
        for i in 1..=3 {
            engine.record_progress(stage, &progress(i * 10, 100), i as f64 * 10.0);
        }
        let first = engine.calculate_stage_eta(stage, &progress(30, 100)).unwrap();
        let second = engine.calculate_stage_eta(stage, &progress(60, 100)).unwrap();

        let expected = 0.2 * second.raw_eta + 0.8 * first.smoothed_eta;
        assert!((second.smoothed_eta - expected).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_penalises_variance() {
        let mut steady = EtaEngine::default();
        let mut noisy = EtaEngine::default();
        let stage = SearchStage::Collecting;

        for i in 1..=4 {
            steady.record_progress(stage, &progress(i * 10, 1000), i as f64 * 10.0);
        }
        noisy.record_progress(stage, &progress(10, 1000), 10.0);
        noisy.record_progress(stage, &progress(100, 1000), 20.0);
        noisy.record_progress(stage, &progress(110, 1000), 300.0);
        noisy.record_progress(stage, &progress(400, 1000), 310.0);

        let steady_calc = steady.calculate_stage_eta(stage, &progress(40, 1000)).unwrap();
        let noisy_calc = noisy.calculate_stage_eta(stage, &progress(400, 1000)).unwrap();

        // four identical speeds: base 1.0 + 0.1 bonus, clamped
        assert_eq!(steady_calc.confidence, 1.0);
        assert!(noisy_calc.confidence < 0.6);
        assert!(noisy_calc.confidence >= 0.0);
    }

    #[test]
    fn test_reset_stage_data() {
        let mut engine = EtaEngine::default();
        for i in 1..=3 {
            engine.record_progress(SearchStage::Collecting, &progress(i, 10), i as f64);
            engine.record_progress(SearchStage::Filtering, &progress(i, 10), i as f64);
        }
        engine.reset_stage_data(SearchStage::Collecting);
        assert!(engine.history(SearchStage::Collecting).is_empty());
        assert_eq!(engine.history(SearchStage::Filtering).len(), 3);

        engine.reset_all_data();
        assert!(engine.history(SearchStage::Filtering).is_empty());
    }

    #[test]
    fn test_overall_eta_skips_completed_stages() {
        let mut engine = EtaEngine::default();
        let mut stages = StageSet::default();
        stages.collecting.status = StageStatus::Completed;
        stages.collecting.set_items(40, 40);
        stages.filtering.status = StageStatus::Running;

        for i in 1..=3 {
            stages.filtering.set_items(i * 10, 100);
            engine.record_progress(SearchStage::Filtering, &stages.filtering, i as f64 * 10.0);
        }

        let overall = engine
            .calculate_overall_eta(&stages, SearchStage::Filtering)
            .unwrap();
        assert_eq!(overall.total_remaining_items, 70);
        assert_eq!(overall.stages.len(), 1);
        // 70 items at 60/min
        assert!((overall.total_eta_seconds - 70.0).abs() < 1e-9);
        assert_eq!(overall.formatted, "1m 10s");
        assert!(overall.confidence > 0.9);
    }

    #[test]
    fn test_overall_eta_requires_current_stage_estimate() {
        let mut engine = EtaEngine::default();
        let stages = StageSet::default();
        assert_eq!(
            engine.calculate_overall_eta(&stages, SearchStage::Collecting),
            Err(EtaError::InsufficientData(SearchStage::Collecting))
        );
    }
}
