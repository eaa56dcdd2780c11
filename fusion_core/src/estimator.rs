//! State estimator: sole owner of the [`TrackState`].
//!
//! The belief is mutated only through [`StateEstimator::predict`],
//! [`StateEstimator::update`], [`StateEstimator::initialize`] and
//! [`StateEstimator::reset`]. Every mutation is followed by a health check; a
//! corrupted belief is discarded (status UNINITIALIZED) instead of propagated.

use crate::{
    error::{FusionError, Result},
    gating::{mahalanobis_gate, GateResult},
    kf::{check_health, CvKalmanFilter, CvKfConfig, KalmanFilter, KfUpdateResult},
    track::{TrackState, TrackStatus},
    types::{Projection, StateCov, StateVec, Timestamp},
};
use nalgebra::Vector6;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for the state estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    #[serde(flatten)]
    pub kf: CvKfConfig,
    /// Initial velocity uncertainty (1σ in m/s)
    pub init_vel_std: f64,
    /// Covariance trace above which the belief is declared corrupted (m²)
    pub max_cov_trace: f64,
    /// Projections older than the estimate by more than this are dropped (s)
    pub max_measurement_lag: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kf: CvKfConfig::default(),
            init_vel_std: 0.25,
            max_cov_trace: 1e3,
            max_measurement_lag: 0.1,
        }
    }
}

/// Runs a [`KalmanFilter`] over the single tracked object.
#[derive(Clone, Debug)]
pub struct StateEstimator<F = CvKalmanFilter> {
    pub config: EstimatorConfig,
    filter: F,
    track: TrackState,
}

impl StateEstimator<CvKalmanFilter> {
    pub fn new(config: EstimatorConfig) -> Self {
        let filter = CvKalmanFilter::new(config.kf.clone());
        Self::with_filter(config, filter)
    }
}

impl<F: KalmanFilter> StateEstimator<F> {
    pub fn with_filter(config: EstimatorConfig, filter: F) -> Self {
        Self {
            config,
            filter,
            track: TrackState::default(),
        }
    }

    pub fn track(&self) -> &TrackState {
        &self.track
    }

    pub fn status(&self) -> TrackStatus {
        self.track.status
    }

    /// Move to `next`. Callers only request documented edges; anything else
    /// is a logic error and is ignored.
    pub(crate) fn set_status(&mut self, next: TrackStatus) -> bool {
        let current = self.track.status;
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            debug_assert!(false, "illegal track transition {current} -> {next}");
            warn!(%current, %next, "ignoring illegal track transition");
            return false;
        }
        self.track.status = next;
        true
    }

    /// Discard the prior and start a new belief at `projection`.
    /// Velocity starts at zero with `init_vel_std` uncertainty.
    pub fn initialize(&mut self, projection: &Projection) -> Result<()> {
        let p = projection.position;
        let state = Vector6::new(p.x, p.y, p.z, 0.0, 0.0, 0.0);
        let vs = self.config.init_vel_std * self.config.init_vel_std;
        let mut cov = StateCov::from_diagonal(&Vector6::new(0.0, 0.0, 0.0, vs, vs, vs));
        cov.fixed_view_mut::<3, 3>(0, 0).copy_from(&projection.covariance);

        if let Err(err) = check_health(&state, &cov, self.config.max_cov_trace) {
            self.reset();
            return Err(err);
        }
        self.track = TrackState::new(state, cov, projection.timestamp);
        debug!(t = projection.timestamp, pos = ?p, "track initialized");
        Ok(())
    }

    /// Advance the belief by `dt` seconds under the motion model.
    /// No-op while uninitialized or for non-positive `dt`.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        if !self.track.is_initialized() || dt <= 0.0 {
            return Ok(());
        }
        let (state, cov) = self.filter.predict(&self.track.state, &self.track.cov, dt);
        self.commit(state, cov)?;
        self.track.timestamp += dt;
        Ok(())
    }

    /// Predict to absolute time `t` (never backwards).
    pub fn predict_to(&mut self, t: Timestamp) -> Result<()> {
        self.predict(t - self.track.timestamp)
    }

    /// Gate `projection` against the current (already predicted) belief.
    pub fn gate(&self, projection: &Projection, threshold: f64) -> GateResult {
        mahalanobis_gate(
            &self.track.state,
            &self.track.cov,
            &projection.position,
            &projection.covariance,
            threshold,
        )
    }

    /// True if `projection` is too far behind the estimate to be applied.
    pub fn is_too_late(&self, projection: &Projection) -> bool {
        self.track.is_initialized()
            && self.track.timestamp - projection.timestamp > self.config.max_measurement_lag
    }

    /// Correct the belief with a gated projection. The caller predicts to the
    /// projection time first; a projection slightly behind the estimate is
    /// applied at the estimate time.
    pub fn update(&mut self, projection: &Projection) -> Result<KfUpdateResult> {
        if !self.track.is_initialized() {
            return Err(FusionError::NumericCorruption(
                "update on an uninitialized track".into(),
            ));
        }
        let res = self.filter.update(
            &self.track.state,
            &self.track.cov,
            &projection.position,
            &projection.covariance,
        )?;
        self.commit(res.state, res.cov)?;
        self.track.last_update_time = self.track.timestamp.max(projection.timestamp);
        self.track.timestamp = self.track.last_update_time;
        self.track.total_updates += 1;
        Ok(res)
    }

    /// Drop the belief entirely.
    pub fn reset(&mut self) {
        self.track = TrackState::default();
    }

    fn commit(&mut self, state: StateVec, cov: StateCov) -> Result<()> {
        if let Err(err) = check_health(&state, &cov, self.config.max_cov_trace) {
            warn!(error = %err, "discarding corrupted track state");
            self.reset();
            return Err(err);
        }
        self.track.state = state;
        self.track.cov = cov;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectionSource;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Vector3};
    use proptest::prelude::*;

    fn projection(x: f64, y: f64, z: f64, t: f64) -> Projection {
        Projection {
            position: Vector3::new(x, y, z),
            covariance: Matrix3::identity() * 1e-4,
            timestamp: t,
            source: ProjectionSource::Fresh,
            range_age: 0.0,
        }
    }

    #[test]
    fn initialize_places_mean_at_projection() {
        let mut est = StateEstimator::new(EstimatorConfig::default());
        est.initialize(&projection(0.1, 0.0, 0.5, 1.0)).unwrap();
        let track = est.track();
        assert_eq!(track.status, TrackStatus::Tracking);
        assert_abs_diff_eq!(track.position(), Vector3::new(0.1, 0.0, 0.5));
        assert_abs_diff_eq!(track.velocity(), Vector3::zeros());
        assert_abs_diff_eq!(track.cov[(0, 0)], 1e-4);
        assert_abs_diff_eq!(track.cov[(3, 3)], 0.0625);
        assert_abs_diff_eq!(track.timestamp, 1.0);
    }

    #[test]
    fn predict_is_noop_when_uninitialized() {
        let mut est = StateEstimator::new(EstimatorConfig::default());
        est.predict(1.0).unwrap();
        assert_eq!(est.status(), TrackStatus::Uninitialized);
        assert_abs_diff_eq!(est.track().cov_trace(), 0.0);
    }

    #[test]
    fn exploding_trace_resets() {
        let cfg = EstimatorConfig {
            max_cov_trace: 1.0,
            ..Default::default()
        };
        let mut est = StateEstimator::new(cfg);
        est.initialize(&projection(0.0, 0.0, 0.5, 0.0)).unwrap();
        let err = est.predict(100.0).unwrap_err();
        assert!(matches!(err, FusionError::NumericCorruption(_)));
        assert_eq!(est.status(), TrackStatus::Uninitialized);
    }

    #[test]
    fn corrupted_projection_resets() {
        let mut est = StateEstimator::new(EstimatorConfig::default());
        est.initialize(&projection(0.0, 0.0, 0.5, 0.0)).unwrap();
        let mut bad = projection(f64::NAN, 0.0, 0.5, 0.0);
        bad.covariance = Matrix3::identity() * 1e-4;
        assert!(est.update(&bad).is_err());
        assert_eq!(est.status(), TrackStatus::Uninitialized);
    }

    #[test]
    fn late_projection_detection() {
        let mut est = StateEstimator::new(EstimatorConfig::default());
        est.initialize(&projection(0.0, 0.0, 0.5, 0.0)).unwrap();
        est.predict_to(1.0).unwrap();
        assert!(est.is_too_late(&projection(0.0, 0.0, 0.5, 0.5)));
        assert!(!est.is_too_late(&projection(0.0, 0.0, 0.5, 0.95)));
    }

    proptest! {
        /// Without updates the mean follows the CV model exactly and the
        /// covariance trace never shrinks.
        #[test]
        fn predict_only_follows_constant_velocity(
            px in -1.0f64..1.0, py in -1.0f64..1.0, pz in 0.1f64..2.0,
            vx in -0.5f64..0.5, vy in -0.5f64..0.5, vz in -0.5f64..0.5,
            dts in proptest::collection::vec(0.0f64..0.2, 1..40),
        ) {
            let mut est = StateEstimator::new(EstimatorConfig::default());
            est.initialize(&projection(px, py, pz, 0.0)).unwrap();
            // seed a velocity directly; initialize always starts at rest
            est.track.state[3] = vx;
            est.track.state[4] = vy;
            est.track.state[5] = vz;

            let mut elapsed = 0.0;
            let mut prev_trace = est.track().cov_trace();
            for dt in dts {
                est.predict(dt).unwrap();
                elapsed += dt;
                let track = est.track();
                prop_assert!((track.state[0] - (px + vx * elapsed)).abs() < 1e-9);
                prop_assert!((track.state[1] - (py + vy * elapsed)).abs() < 1e-9);
                prop_assert!((track.state[2] - (pz + vz * elapsed)).abs() < 1e-9);
                prop_assert!((track.state[3] - vx).abs() < 1e-12);
                prop_assert!(track.cov_trace() >= prev_trace);
                prev_trace = track.cov_trace();
            }
        }
    }
}
