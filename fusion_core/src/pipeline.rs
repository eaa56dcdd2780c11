//! Fusion pipeline: the single owner of every piece of mutable fusion state.
//!
//! # Processing per event (strictly sequential)
//! 1. Raw input → [`MeasurementAdapter`] (noise attached, order enforced)
//! 2. Range → cached by the [`CoordinateProjector`]
//! 3. Detection → projected, then handed to the [`TrackManager`] which gates
//!    it and drives the [`StateEstimator`]
//! 4. No-detection → only advances timeout evaluation
//! 5. Tick → timeouts, predict to "now", publish to the sink
//!
//! Nothing here is shared: the threaded runtime in [`crate::node`] wraps one
//! pipeline in one thread and feeds it through a queue.

use crate::{
    adapter::MeasurementAdapter,
    config::FusionConfig,
    error::{FusionError, Result},
    estimator::StateEstimator,
    projector::CoordinateProjector,
    publisher::{EstimateSink, FusedEstimate, Publisher},
    track::{TrackState, TrackStatus},
    track_manager::{ProjectionOutcome, TrackManager, Transition},
    types::{Measurement, ProjectionSource, RawInput, Timestamp},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Running counters over the lifetime of a pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Projections that initialized or updated the track
    pub accepted_projections: u64,
    /// Out-of-order readings and projections too far behind the estimate
    pub stale_inputs: u64,
    /// Non-finite, out-of-band or degenerate readings
    pub invalid_inputs: u64,
    pub gated_outliers: u64,
    /// Projections built with a range outside the staleness window
    pub range_stale_projections: u64,
    /// Detections received before any range reading
    pub unprojectable_detections: u64,
    /// Beliefs discarded for numeric corruption
    pub numeric_resets: u64,
    pub singular_innovations: u64,
    /// Timeout-driven degradations (TRACKING → COASTING, COASTING → LOST)
    pub sensor_timeouts: u64,
    /// Inputs dropped because the node queue was full
    pub dropped_inputs: u64,
    pub published: u64,
    pub transitions: u64,
}

impl FusionStats {
    fn note(&mut self, err: &FusionError) {
        match err {
            FusionError::StaleInput { .. } => self.stale_inputs += 1,
            FusionError::InvalidInput { .. } => self.invalid_inputs += 1,
            FusionError::GatedOutlier { .. } => self.gated_outliers += 1,
            FusionError::SensorTimeout { .. } => self.sensor_timeouts += 1,
            FusionError::NumericCorruption(_) => self.numeric_resets += 1,
            FusionError::SingularInnovation => self.singular_innovations += 1,
            FusionError::InvalidConfig(_) | FusionError::Config(_) | FusionError::Shutdown => {}
        }
    }
}

/// What the pipeline did with one measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Range stored for upcoming detections
    RangeCached,
    /// Detection started a new track
    Initialized,
    /// Detection passed the gate and corrected the track
    Updated,
    /// Detection arrived before any range reading
    Unprojectable,
    /// Explicit no-detection; timeouts evaluated
    NoDetection,
}

impl From<ProjectionOutcome> for Disposition {
    fn from(outcome: ProjectionOutcome) -> Self {
        match outcome {
            ProjectionOutcome::Initialized => Disposition::Initialized,
            ProjectionOutcome::Updated => Disposition::Updated,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Adapter → projector → track manager / estimator → publisher.
pub struct FusionPipeline<S> {
    config: FusionConfig,
    adapter: MeasurementAdapter,
    projector: CoordinateProjector,
    estimator: StateEstimator,
    manager: TrackManager,
    publisher: Publisher,
    sink: S,
    stats: FusionStats,
    transitions: Vec<Transition>,
}

impl<S: EstimateSink> FusionPipeline<S> {
    /// Build a pipeline from a validated copy of `config`.
    pub fn new(config: FusionConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            adapter: MeasurementAdapter::new(config.adapter.clone()),
            projector: CoordinateProjector::new(config.projector.clone(), config.camera.camera()),
            estimator: StateEstimator::new(config.filter.clone()),
            manager: TrackManager::new(config.track.clone()),
            publisher: Publisher::new(config.publisher.clone()),
            config,
            sink,
            stats: FusionStats::default(),
            transitions: Vec::new(),
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn stats(&self) -> &FusionStats {
        &self.stats
    }

    pub fn track(&self) -> &TrackState {
        self.estimator.track()
    }

    pub fn status(&self) -> TrackStatus {
        self.estimator.status()
    }

    pub fn projector(&self) -> &CoordinateProjector {
        &self.projector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Status transitions since the last call.
    pub fn drain_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Count an input dropped before it reached the pipeline.
    pub fn note_dropped(&mut self, n: u64) {
        self.stats.dropped_inputs += n;
    }

    /// Normalize and process one raw input. Every error is non-fatal.
    pub fn handle_input(&mut self, raw: RawInput) -> Result<Disposition> {
        let measurement = self.adapter.adapt(raw).inspect_err(|e| self.stats.note(e))?;
        self.process_measurement(measurement)
    }

    /// Consume one normalized measurement.
    pub fn process_measurement(&mut self, measurement: Measurement) -> Result<Disposition> {
        let res = self.dispatch(measurement);
        if let Err(err) = &res {
            debug!(error = %err, "measurement not applied");
            self.stats.note(err);
        }
        self.collect_transitions();
        res
    }

    fn dispatch(&mut self, measurement: Measurement) -> Result<Disposition> {
        match measurement {
            Measurement::Range(reading) => {
                self.projector.cache_range(reading);
                self.check_timeouts(reading.timestamp);
                Ok(Disposition::RangeCached)
            }
            Measurement::Detection(reading) => {
                let Some(projection) = self.projector.project(&reading) else {
                    self.stats.unprojectable_detections += 1;
                    debug!(t = reading.timestamp, "detection before any range, skipped");
                    self.check_timeouts(reading.timestamp);
                    return Ok(Disposition::Unprojectable);
                };
                if projection.source == ProjectionSource::RangeStale {
                    self.stats.range_stale_projections += 1;
                }
                let res = self.manager.on_projection(&mut self.estimator, &projection);
                if res.is_ok() {
                    self.stats.accepted_projections += 1;
                }
                // A streak of rejected projections still counts as absence.
                self.check_timeouts(projection.timestamp);
                res.map(Disposition::from)
            }
            Measurement::NoDetection { timestamp } => {
                self.check_timeouts(timestamp);
                Ok(Disposition::NoDetection)
            }
        }
    }

    fn check_timeouts(&mut self, now: Timestamp) {
        if let Some(err) = self.manager.check_timeouts(&mut self.estimator, now) {
            self.stats.note(&err);
        }
    }

    /// Publish tick: apply timeouts, roll the estimate to `now`, emit it.
    pub fn tick(&mut self, now: Timestamp) -> FusedEstimate {
        self.check_timeouts(now);

        let from = self.estimator.status();
        let out = self.publisher.tick(&mut self.estimator, now);
        if let Some(err) = &out.error {
            self.stats.note(err);
            if self.estimator.status() == TrackStatus::Uninitialized {
                self.manager.note_reset(from, now);
            }
        }
        self.collect_transitions();

        self.sink.publish(&out.estimate);
        self.stats.published += 1;
        out.estimate
    }

    fn collect_transitions(&mut self) {
        let fresh = self.manager.drain_transitions();
        self.stats.transitions += fresh.len() as u64;
        self.transitions.extend(fresh);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
