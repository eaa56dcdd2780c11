//! Evaluation metrics: RMSE position/velocity, status occupancy, NEES.

use crate::{
    publisher::FusedEstimate,
    track::TrackStatus,
    types::{PosVec, Timestamp},
};
use serde::{Deserialize, Serialize};

/// True apple state in the reference frame at a given time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub time: Timestamp,
    pub position: PosVec,
    pub velocity: PosVec,
}

/// Accumulated statistics over a run of published estimates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingMetrics {
    /// Number of estimates evaluated
    pub n_estimates: u64,
    pub n_uninitialized: u64,
    pub n_tracking: u64,
    pub n_coasting: u64,
    pub n_lost: u64,
    /// Sum of squared position errors over TRACKING estimates
    pub sum_sq_pos_err: f64,
    /// Sum of squared velocity errors over TRACKING estimates
    pub sum_sq_vel_err: f64,
    /// Largest position error seen while TRACKING (m)
    pub max_pos_err: f64,
    /// Sum of position NEES over TRACKING estimates
    pub sum_pos_nees: f64,
    pub n_nees: u64,
    /// Time of the first estimate evaluated
    pub start_time: Option<Timestamp>,
    /// Delay from the first estimate to the first TRACKING estimate (s)
    pub time_to_first_track: Option<f64>,
}

impl TrackingMetrics {
    /// Root-mean-square position error while TRACKING (m).
    pub fn rmse_position(&self) -> f64 {
        if self.n_tracking == 0 {
            return 0.0;
        }
        (self.sum_sq_pos_err / self.n_tracking as f64).sqrt()
    }

    /// Root-mean-square velocity error while TRACKING (m/s).
    pub fn rmse_velocity(&self) -> f64 {
        if self.n_tracking == 0 {
            return 0.0;
        }
        (self.sum_sq_vel_err / self.n_tracking as f64).sqrt()
    }

    /// Share of estimates a consumer could act on.
    pub fn tracking_fraction(&self) -> f64 {
        if self.n_estimates == 0 {
            return 0.0;
        }
        self.n_tracking as f64 / self.n_estimates as f64
    }

    /// Mean position NEES; ≈ 3 for a consistent filter.
    pub fn mean_position_nees(&self) -> Option<f64> {
        (self.n_nees > 0).then(|| self.sum_pos_nees / self.n_nees as f64)
    }

    /// Accumulate one published estimate against the truth at its stamp.
    pub fn accumulate(&mut self, estimate: &FusedEstimate, truth: &GroundTruth) {
        self.n_estimates += 1;
        let stamp = estimate.header.stamp;
        let start = *self.start_time.get_or_insert(stamp);

        match estimate.status {
            TrackStatus::Uninitialized => self.n_uninitialized += 1,
            TrackStatus::Coasting => self.n_coasting += 1,
            TrackStatus::Lost => self.n_lost += 1,
            TrackStatus::Tracking => {
                self.n_tracking += 1;
                if self.time_to_first_track.is_none() {
                    self.time_to_first_track = Some(stamp - start);
                }
                let pos_err = estimate.position - truth.position;
                let vel_err = estimate.velocity - truth.velocity;
                self.sum_sq_pos_err += pos_err.norm_squared();
                self.sum_sq_vel_err += vel_err.norm_squared();
                self.max_pos_err = self.max_pos_err.max(pos_err.norm());
                if let Some(chol) = estimate.position_covariance.cholesky() {
                    self.sum_pos_nees += pos_err.dot(&chol.solve(&pos_err));
                    self.n_nees += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Header;
    use crate::types::StateCov;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Vector3};

    fn estimate(stamp: f64, z: f64, status: TrackStatus) -> FusedEstimate {
        let cov = StateCov::identity() * 1e-2;
        FusedEstimate {
            header: Header {
                seq: 0,
                stamp,
                frame_id: "palm".into(),
            },
            position: Vector3::new(0.0, 0.0, z),
            velocity: Vector3::zeros(),
            covariance: cov,
            position_covariance: Matrix3::identity() * 1e-2,
            covariance_trace: cov.trace(),
            status,
            age: 0.0,
        }
    }

    fn truth(t: f64) -> GroundTruth {
        GroundTruth {
            time: t,
            position: Vector3::new(0.0, 0.0, 0.5),
            velocity: Vector3::zeros(),
        }
    }

    #[test]
    fn rmse_counts_only_tracking() {
        let mut m = TrackingMetrics::default();
        m.accumulate(&estimate(0.0, 0.0, TrackStatus::Uninitialized), &truth(0.0));
        m.accumulate(&estimate(0.1, 0.6, TrackStatus::Tracking), &truth(0.1));
        m.accumulate(&estimate(0.2, 0.4, TrackStatus::Tracking), &truth(0.2));
        m.accumulate(&estimate(0.3, 9.0, TrackStatus::Lost), &truth(0.3));

        assert_eq!(m.n_estimates, 4);
        assert_eq!((m.n_uninitialized, m.n_tracking, m.n_lost), (1, 2, 1));
        assert_abs_diff_eq!(m.rmse_position(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(m.max_pos_err, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(m.time_to_first_track.unwrap(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(m.tracking_fraction(), 0.5);
        // (0.1)² / 1e-2 per estimate
        assert_abs_diff_eq!(m.mean_position_nees().unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_metrics_are_zero() {
        let m = TrackingMetrics::default();
        assert_eq!(m.rmse_position(), 0.0);
        assert_eq!(m.tracking_fraction(), 0.0);
        assert!(m.mean_position_nees().is_none());
    }
}
