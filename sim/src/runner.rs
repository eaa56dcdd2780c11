//! Offline evaluation: drive a [`FusionPipeline`] with a recorded log on a
//! virtual clock and score every published estimate against ground truth.

use crate::replay::ReplayLog;
use fusion_core::{
    metrics::TrackingMetrics,
    track_manager::Transition,
    FusedEstimate, FusionConfig, FusionPipeline, FusionStats,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything a run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario: String,
    pub seed: u64,
    pub metrics: TrackingMetrics,
    pub stats: FusionStats,
    pub transitions: Vec<Transition>,
    #[serde(skip)]
    pub estimates: Vec<FusedEstimate>,
}

/// Replay `log` through a fresh pipeline built from `config`.
///
/// Publish ticks are interleaved with inputs by arrival time, exactly as the
/// node's owner thread would see them.
pub fn evaluate(log: &ReplayLog, config: &FusionConfig) -> anyhow::Result<RunSummary> {
    let mut pipeline = FusionPipeline::new(config.clone(), Vec::new())?;
    let mut metrics = TrackingMetrics::default();
    let mut clock = TickClock::new(config.publisher.period());

    for timed in &log.inputs {
        clock.run_until(timed.arrival, &mut pipeline, &mut metrics, log);
        // Rejections are counted in the pipeline stats.
        let _ = pipeline.handle_input(timed.input.clone());
    }
    clock.run_until(log.duration, &mut pipeline, &mut metrics, log);

    let stats = pipeline.stats().clone();
    let transitions = pipeline.drain_transitions();
    info!(
        scenario = %log.scenario_name,
        rmse = metrics.rmse_position(),
        tracking = metrics.tracking_fraction(),
        "run evaluated"
    );
    Ok(RunSummary {
        scenario: log.scenario_name.clone(),
        seed: log.seed,
        metrics,
        stats,
        transitions,
        estimates: pipeline.into_sink(),
    })
}

/// Virtual publish timer.
struct TickClock {
    period: f64,
    ticks: u64,
}

impl TickClock {
    fn new(period: f64) -> Self {
        Self { period, ticks: 0 }
    }

    fn next(&self) -> f64 {
        self.ticks as f64 * self.period
    }

    fn run_until(
        &mut self,
        until: f64,
        pipeline: &mut FusionPipeline<Vec<FusedEstimate>>,
        metrics: &mut TrackingMetrics,
        log: &ReplayLog,
    ) {
        while self.next() <= until {
            let now = self.next();
            let estimate = pipeline.tick(now);
            if let Some(truth) = log.truth_at(now) {
                metrics.accumulate(&estimate, &truth);
            }
            self.ticks += 1;
        }
    }
}
