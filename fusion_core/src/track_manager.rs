//! Track lifecycle management: initiation, gating, coasting, loss, reset.
//!
//! # Track Management Policy
//! - **Initiation**: the first projection while UNINITIALIZED (or LOST)
//!   initializes the estimator from scratch and enters TRACKING.
//! - **Gating**: while TRACKING or COASTING a projection must pass the χ²
//!   gate to update the estimator. A single rejection changes nothing else.
//! - **Coasting**: a run of `max_consecutive_rejections` rejections, or no
//!   accepted projection for longer than `timeout_no_detection`, moves
//!   TRACKING → COASTING. An accepted projection returns to TRACKING.
//! - **Loss**: no accepted projection for longer than `timeout_lost` moves
//!   COASTING → LOST. The old belief is kept for publishing but is discarded
//!   by the next projection.
//! - **Reset**: a LOST track that sees nothing for longer than
//!   `timeout_reset` drops its belief and returns to UNINITIALIZED, before
//!   its predicted covariance can grow without bound.

use crate::{
    error::{FusionError, Result},
    estimator::StateEstimator,
    gating::CHI2_99,
    kf::KalmanFilter,
    track::TrackStatus,
    types::{Projection, SourceKind, Timestamp},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for track management policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManagerConfig {
    /// Mahalanobis gate threshold (χ² value, 3 dof)
    pub gate_threshold: f64,
    /// Consecutive gate rejections that force COASTING
    pub max_consecutive_rejections: u32,
    /// Seconds without an accepted projection before COASTING
    pub timeout_no_detection: f64,
    /// Seconds without an accepted projection before LOST
    pub timeout_lost: f64,
    /// Seconds without an accepted projection before a LOST belief is dropped
    pub timeout_reset: f64,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            gate_threshold: CHI2_99[3],
            max_consecutive_rejections: 5,
            timeout_no_detection: 0.5,
            timeout_lost: 2.0,
            timeout_reset: 10.0,
        }
    }
}

/// Why the track changed status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    /// First projection of a new track
    Initiated,
    /// Accepted projection after a gap
    Reacquired,
    /// Consecutive gate rejections
    RejectStreak,
    /// `timeout_no_detection` elapsed
    NoDetectionTimeout,
    /// `timeout_lost` elapsed
    LostTimeout,
    /// `timeout_reset` elapsed while LOST
    ResetTimeout,
    /// Belief discarded after numeric corruption
    NumericCorruption,
}

/// A status change emitted to the publisher.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: TrackStatus,
    pub to: TrackStatus,
    pub at: Timestamp,
    pub reason: TransitionReason,
}

/// What happened to a projection handed to the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// Started a new track (from UNINITIALIZED or LOST)
    Initialized,
    /// Passed the gate and corrected the estimate
    Updated,
}

/// Drives the single track through its lifecycle.
pub struct TrackManager {
    pub config: TrackManagerConfig,
    reject_streak: u32,
    transitions: Vec<Transition>,
}

impl TrackManager {
    pub fn new(config: TrackManagerConfig) -> Self {
        Self {
            config,
            reject_streak: 0,
            transitions: Vec::new(),
        }
    }

    /// Current run of consecutive gate rejections.
    pub fn reject_streak(&self) -> u32 {
        self.reject_streak
    }

    /// Take the transitions recorded since the last call.
    pub fn drain_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Route one projection through initiation or gating + update.
    ///
    /// Errors are non-fatal: `GatedOutlier` and `StaleInput` leave the track
    /// untouched; `NumericCorruption` / `SingularInnovation` leave it reset.
    pub fn on_projection<F: KalmanFilter>(
        &mut self,
        estimator: &mut StateEstimator<F>,
        projection: &Projection,
    ) -> Result<ProjectionOutcome> {
        let t = projection.timestamp;
        match estimator.status() {
            TrackStatus::Uninitialized | TrackStatus::Lost => {
                let from = estimator.status();
                self.guard(estimator, t, |est| est.initialize(projection))?;
                self.reject_streak = 0;
                let reason = if from == TrackStatus::Lost {
                    TransitionReason::Reacquired
                } else {
                    TransitionReason::Initiated
                };
                self.record(from, TrackStatus::Tracking, t, reason);
                Ok(ProjectionOutcome::Initialized)
            }
            TrackStatus::Tracking | TrackStatus::Coasting => {
                if estimator.is_too_late(projection) {
                    return Err(FusionError::StaleInput {
                        sensor: SourceKind::Detection,
                        stamp: t,
                        latest: estimator.track().timestamp,
                    });
                }
                self.guard(estimator, t, |est| est.predict_to(t))?;

                let gate = estimator.gate(projection, self.config.gate_threshold);
                if !gate.passes {
                    self.reject_streak += 1;
                    debug!(d2 = gate.d2, streak = self.reject_streak, "projection gated out");
                    if self.reject_streak >= self.config.max_consecutive_rejections
                        && estimator.set_status(TrackStatus::Coasting)
                    {
                        self.record(
                            TrackStatus::Tracking,
                            TrackStatus::Coasting,
                            t,
                            TransitionReason::RejectStreak,
                        );
                    }
                    return Err(FusionError::GatedOutlier {
                        d2: gate.d2,
                        threshold: self.config.gate_threshold,
                    });
                }

                self.guard(estimator, t, |est| est.update(projection).map(|_| ()))?;
                self.reject_streak = 0;
                if estimator.set_status(TrackStatus::Tracking) {
                    self.record(
                        TrackStatus::Coasting,
                        TrackStatus::Tracking,
                        t,
                        TransitionReason::Reacquired,
                    );
                }
                Ok(ProjectionOutcome::Updated)
            }
        }
    }

    /// Apply the no-detection, lost and reset timeouts at time `now`.
    /// Returns the timeout error when the track degraded at this call.
    pub fn check_timeouts<F: KalmanFilter>(
        &mut self,
        estimator: &mut StateEstimator<F>,
        now: Timestamp,
    ) -> Option<FusionError> {
        if estimator.status() == TrackStatus::Uninitialized {
            return None;
        }
        let elapsed = now - estimator.track().last_update_time;
        let mut degraded = None;

        if estimator.status() == TrackStatus::Tracking && elapsed > self.config.timeout_no_detection {
            estimator.set_status(TrackStatus::Coasting);
            self.record(
                TrackStatus::Tracking,
                TrackStatus::Coasting,
                now,
                TransitionReason::NoDetectionTimeout,
            );
            degraded = Some(FusionError::SensorTimeout {
                elapsed,
                limit: self.config.timeout_no_detection,
            });
        }
        if estimator.status() == TrackStatus::Coasting && elapsed > self.config.timeout_lost {
            estimator.set_status(TrackStatus::Lost);
            self.record(
                TrackStatus::Coasting,
                TrackStatus::Lost,
                now,
                TransitionReason::LostTimeout,
            );
            degraded = Some(FusionError::SensorTimeout {
                elapsed,
                limit: self.config.timeout_lost,
            });
        }
        if estimator.status() == TrackStatus::Lost && elapsed > self.config.timeout_reset {
            estimator.reset();
            self.reject_streak = 0;
            self.record(
                TrackStatus::Lost,
                TrackStatus::Uninitialized,
                now,
                TransitionReason::ResetTimeout,
            );
            degraded = Some(FusionError::SensorTimeout {
                elapsed,
                limit: self.config.timeout_reset,
            });
        }
        degraded
    }

    /// Note a reset performed outside the manager (numeric corruption).
    pub fn note_reset(&mut self, from: TrackStatus, at: Timestamp) {
        self.reject_streak = 0;
        if from != TrackStatus::Uninitialized {
            self.record(from, TrackStatus::Uninitialized, at, TransitionReason::NumericCorruption);
        }
    }

    /// Run an estimator operation; record the reset if it corrupted the belief.
    fn guard<F: KalmanFilter>(
        &mut self,
        estimator: &mut StateEstimator<F>,
        at: Timestamp,
        op: impl FnOnce(&mut StateEstimator<F>) -> Result<()>,
    ) -> Result<()> {
        let from = estimator.status();
        let res = op(estimator);
        if res.is_err() && estimator.status() == TrackStatus::Uninitialized {
            self.note_reset(from, at);
        }
        res
    }

    fn record(&mut self, from: TrackStatus, to: TrackStatus, at: Timestamp, reason: TransitionReason) {
        info!(%from, %to, t = at, ?reason, "track status changed");
        self.transitions.push(Transition { from, to, at, reason });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
