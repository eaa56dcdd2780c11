//! Coordinate projector: detection box center + range → 3D position hypothesis.
//!
//! # Algorithm
//! 1. Back-project the box center through the inverse pinhole model to a unit
//!    ray in camera space, scale it by the range, and transform the point into
//!    the reference frame with the fixed extrinsics.
//! 2. Propagate pixel and range noise to first order:
//!    Σ_ref = R · J · diag(σ_u², σ_v², σ_ρ²) · Jᵀ · Rᵀ
//!    where J = ∂p_cam/∂(u, v, ρ) and R is the extrinsic rotation.
//!
//! The projector owns the last-known range. A range alone is not 3D-resolving,
//! so it is only cached; detections consume it.

use crate::types::{DetectionReading, Projection, ProjectionSource, RangeReading};
use nalgebra::{Matrix3, Vector3};
use sensor_models::PinholeCamera;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for range freshness and stale-range handling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Max |detection time − range time| for a range to count as fresh (s)
    pub staleness_window: f64,
    /// Multiplier on the range variance when the range is stale
    pub stale_variance_factor: f64,
    /// Additional depth std growth per second of range age (m/s)
    pub stale_std_growth: f64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            staleness_window: 1.0 / 30.0, // one camera frame
            stale_variance_factor: 4.0,
            stale_std_growth: 0.05,
        }
    }
}

/// Projects detections into the reference frame using the cached range.
#[derive(Clone, Debug)]
pub struct CoordinateProjector {
    pub config: ProjectorConfig,
    camera: PinholeCamera,
    last_range: Option<RangeReading>,
}

impl CoordinateProjector {
    pub fn new(config: ProjectorConfig, camera: PinholeCamera) -> Self {
        Self {
            config,
            camera,
            last_range: None,
        }
    }

    pub fn camera(&self) -> &PinholeCamera {
        &self.camera
    }

    pub fn latest_range(&self) -> Option<&RangeReading> {
        self.last_range.as_ref()
    }

    /// Remember `reading` for upcoming detections.
    pub fn cache_range(&mut self, reading: RangeReading) {
        match &self.last_range {
            Some(prev) if prev.timestamp > reading.timestamp => {}
            _ => self.last_range = Some(reading),
        }
    }

    /// Project `detection`. `None` when no range has ever been received.
    pub fn project(&self, detection: &DetectionReading) -> Option<Projection> {
        let range = self.last_range.as_ref()?;
        let range_age = (detection.timestamp - range.timestamp).abs();

        let (source, depth_variance) = if range_age <= self.config.staleness_window {
            (ProjectionSource::Fresh, range.variance)
        } else {
            let growth = self.config.stale_std_growth * range_age;
            (
                ProjectionSource::RangeStale,
                range.variance * self.config.stale_variance_factor + growth * growth,
            )
        };

        let (u, v) = detection.pixel_box.center();
        let p_cam = self.camera.back_project(u, v, range.distance);
        let jac = self.camera.back_project_jacobian(u, v, range.distance);
        let input_cov = Matrix3::from_diagonal(&Vector3::new(
            detection.pixel_variance,
            detection.pixel_variance,
            depth_variance,
        ));
        let cam_cov = jac * input_cov * jac.transpose();
        let rot = self.camera.rotation();
        let covariance = rot * cam_cov * rot.transpose();
        let position = self.camera.to_reference(&p_cam).coords;

        if source == ProjectionSource::RangeStale {
            debug!(range_age, "projecting with stale range");
        }

        Some(Projection {
            position,
            covariance: (covariance + covariance.transpose()) * 0.5,
            timestamp: detection.timestamp.max(range.timestamp),
            source,
            range_age,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelBox;
    use approx::assert_abs_diff_eq;
    use nalgebra::Point3;
    use sensor_models::{Extrinsics, Intrinsics};

    fn range(distance: f64, t: f64) -> RangeReading {
        RangeReading {
            distance,
            variance: 1e-4,
            timestamp: t,
        }
    }

    fn detection_at(u: f64, v: f64, t: f64) -> DetectionReading {
        DetectionReading {
            pixel_box: PixelBox::centered(u, v, 40.0, 30.0),
            confidence: 0.9,
            pixel_variance: 16.0,
            timestamp: t,
        }
    }

    fn projector(ext: Extrinsics) -> CoordinateProjector {
        CoordinateProjector::new(
            ProjectorConfig::default(),
            PinholeCamera::new(Intrinsics::default(), &ext),
        )
    }

    #[test]
    fn principal_point_lands_on_optical_axis() {
        let mut proj = projector(Extrinsics::default());
        proj.cache_range(range(0.50, 0.0));
        let k = proj.camera().intrinsics;
        let p = proj.project(&detection_at(k.cx, k.cy, 0.01)).unwrap();
        assert_abs_diff_eq!(p.position, Vector3::new(0.0, 0.0, 0.50), epsilon = 1e-12);
        assert_eq!(p.source, ProjectionSource::Fresh);
        // Depth uncertainty is the range variance; lateral is pixel noise scaled by depth/f.
        assert_abs_diff_eq!(p.covariance[(2, 2)], 1e-4, epsilon = 1e-12);
        let lateral = 16.0 * (0.5 / k.fx).powi(2);
        assert_abs_diff_eq!(p.covariance[(0, 0)], lateral, epsilon = 1e-12);
    }

    #[test]
    fn reproduces_known_point() {
        let ext = Extrinsics {
            translation: [0.05, 0.0, -0.02],
            rpy: [0.1, -0.2, 0.3],
        };
        let mut proj = projector(ext);
        let cam = proj.camera().clone();

        let p_ref = Point3::new(0.12, -0.04, 0.55);
        let p_cam = cam.from_reference(&p_ref);
        let (u, v) = cam.project(&p_cam).unwrap();
        proj.cache_range(range(p_cam.coords.norm(), 1.0));

        let p = proj.project(&detection_at(u, v, 1.0)).unwrap();
        assert_abs_diff_eq!(p.position, p_ref.coords, epsilon = 1e-9);
    }

    #[test]
    fn stale_range_inflates_depth() {
        let mut proj = projector(Extrinsics::default());
        proj.cache_range(range(0.5, 0.0));
        let k = proj.camera().intrinsics;
        let fresh = proj.project(&detection_at(k.cx, k.cy, 0.02)).unwrap();
        let stale = proj.project(&detection_at(k.cx, k.cy, 1.0)).unwrap();
        assert_eq!(stale.source, ProjectionSource::RangeStale);
        assert!(stale.covariance[(2, 2)] > fresh.covariance[(2, 2)] * 4.0);
        assert_abs_diff_eq!(stale.covariance[(0, 0)], fresh.covariance[(0, 0)], epsilon = 1e-15);
        assert_abs_diff_eq!(stale.range_age, 1.0);
    }

    #[test]
    fn no_range_no_projection() {
        let proj = projector(Extrinsics::default());
        assert!(proj.project(&detection_at(320.0, 180.0, 0.0)).is_none());
    }

    #[test]
    fn timestamp_never_precedes_inputs() {
        let mut proj = projector(Extrinsics::default());
        proj.cache_range(range(0.5, 2.0));
        let p = proj.project(&detection_at(320.0, 180.0, 1.99)).unwrap();
        assert!(p.timestamp >= 2.0);
        // An older range never replaces a newer one.
        proj.cache_range(range(0.9, 1.0));
        assert_eq!(proj.latest_range().unwrap().distance, 0.5);
    }
}
