//! Publisher: rolls the estimate to "now" on every tick and emits it,
//! whatever the track status, so consumers always get a labeled answer.

use crate::{
    error::FusionError,
    estimator::StateEstimator,
    kf::KalmanFilter,
    track::{TrackState, TrackStatus},
    types::{PosCov, PosVec, StateCov, Timestamp},
};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Output rate and labeling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Publish ticks per second
    pub rate_hz: f64,
    /// Frame id stamped on every estimate (the reference frame)
    pub frame_id: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30.0,
            frame_id: sensor_models::PALM_FRAME.to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn period(&self) -> f64 {
        1.0 / self.rate_hz
    }
}

/// Message header: sequence number, stamp, frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Wraps to 0 after `u32::MAX`
    pub seq: u32,
    pub stamp: Timestamp,
    pub frame_id: String,
}

/// One published estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    pub header: Header,
    pub position: PosVec,
    pub velocity: PosVec,
    pub covariance: StateCov,
    pub position_covariance: PosCov,
    pub covariance_trace: f64,
    pub status: TrackStatus,
    /// Seconds since the last measurement correction (0 when uninitialized)
    pub age: f64,
}

impl FusedEstimate {
    /// Only a TRACKING estimate is fresh enough to act on.
    pub fn is_actionable(&self) -> bool {
        self.status == TrackStatus::Tracking
    }
}

/// Where estimates go (visualizer, arm controller, test harness).
pub trait EstimateSink {
    fn publish(&mut self, estimate: &FusedEstimate);
}

impl EstimateSink for Vec<FusedEstimate> {
    fn publish(&mut self, estimate: &FusedEstimate) {
        self.push(estimate.clone());
    }
}

/// Never blocks the owner thread: a full consumer queue drops the estimate.
impl EstimateSink for Sender<FusedEstimate> {
    fn publish(&mut self, estimate: &FusedEstimate) {
        match self.try_send(estimate.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(seq = estimate.header.seq, "estimate consumer is lagging, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Result of one publish tick.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub estimate: FusedEstimate,
    /// Set when rolling the estimate forward corrupted (and reset) it
    pub error: Option<FusionError>,
}

/// Fixed-rate estimate publisher.
pub struct Publisher {
    pub config: PublisherConfig,
    seq: u32,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> Self {
        Self { config, seq: 0 }
    }

    /// Predict the belief to `now` and build the estimate for this tick.
    pub fn tick<F: KalmanFilter>(
        &mut self,
        estimator: &mut StateEstimator<F>,
        now: Timestamp,
    ) -> TickOutput {
        let error = estimator.predict_to(now).err();
        if let Some(err) = &error {
            warn!(error = %err, "estimate reset while coasting to publish time");
        }
        let estimate = self.build(estimator.track(), now);
        TickOutput { estimate, error }
    }

    fn build(&mut self, track: &TrackState, now: Timestamp) -> FusedEstimate {
        let header = Header {
            seq: self.seq,
            stamp: now,
            frame_id: self.config.frame_id.clone(),
        };
        self.seq = self.seq.wrapping_add(1);

        let age = if track.is_initialized() {
            (now - track.last_update_time).max(0.0)
        } else {
            0.0
        };
        FusedEstimate {
            header,
            position: track.position(),
            velocity: track.velocity(),
            covariance: track.cov,
            position_covariance: track.position_cov(),
            covariance_trace: track.cov_trace(),
            status: track.status,
            age,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorConfig;
    use crate::types::{Projection, ProjectionSource};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn uninitialized_still_publishes() {
        let mut publisher = Publisher::new(PublisherConfig::default());
        let mut est = StateEstimator::new(EstimatorConfig::default());
        let out = publisher.tick(&mut est, 1.0);
        assert!(out.error.is_none());
        assert_eq!(out.estimate.status, TrackStatus::Uninitialized);
        assert!(!out.estimate.is_actionable());
        assert_eq!(out.estimate.header.frame_id, "palm");
    }

    #[test]
    fn tick_rolls_estimate_to_now() {
        let mut publisher = Publisher::new(PublisherConfig::default());
        let mut est = StateEstimator::new(EstimatorConfig::default());
        est.initialize(&Projection {
            position: Vector3::new(0.0, 0.0, 0.5),
            covariance: Matrix3::identity() * 1e-4,
            timestamp: 0.0,
            source: ProjectionSource::Fresh,
            range_age: 0.0,
        })
        .unwrap();
        let trace0 = est.track().cov_trace();

        let first = publisher.tick(&mut est, 0.1).estimate;
        let second = publisher.tick(&mut est, 0.2).estimate;
        assert_eq!((first.header.seq, second.header.seq), (0, 1));
        assert_abs_diff_eq!(second.header.stamp, 0.2);
        assert_abs_diff_eq!(est.track().timestamp, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(second.age, 0.2, epsilon = 1e-12);
        assert!(second.covariance_trace > first.covariance_trace);
        assert!(first.covariance_trace > trace0);
        assert!(second.is_actionable());
    }

    #[test]
    fn sequence_wraps() {
        let mut publisher = Publisher::new(PublisherConfig::default());
        publisher.seq = u32::MAX;
        let mut est = StateEstimator::new(EstimatorConfig::default());
        assert_eq!(publisher.tick(&mut est, 0.0).estimate.header.seq, u32::MAX);
        assert_eq!(publisher.tick(&mut est, 0.1).estimate.header.seq, 0);
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = tx;
        let mut publisher = Publisher::new(PublisherConfig::default());
        let mut est = StateEstimator::new(EstimatorConfig::default());
        for t in 0..3 {
            let out = publisher.tick(&mut est, t as f64);
            sink.publish(&out.estimate);
        }
        assert_eq!(rx.try_iter().count(), 1);
    }
}
