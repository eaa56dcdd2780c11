//! Startup configuration for the whole fusion node.
//!
//! Every section defaults independently, so a TOML file only needs the keys
//! it changes:
//!
//! ```toml
//! [track]
//! timeout_lost = 3.0
//!
//! [camera.extrinsics]
//! translation = [0.0, 0.02, 0.0]
//! rpy = [0.0, 0.0, 0.0]
//! ```

use crate::{
    adapter::AdapterConfig,
    error::{FusionError, Result},
    estimator::EstimatorConfig,
    projector::ProjectorConfig,
    publisher::PublisherConfig,
    track_manager::TrackManagerConfig,
};
use sensor_models::{Extrinsics, Intrinsics, PinholeCamera, PALM_FRAME};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Publish rates outside this band are rejected.
const MIN_RATE_HZ: f64 = 0.1;
const MAX_RATE_HZ: f64 = 1000.0;

/// Camera calibration source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Physical mounting frame of the camera
    pub frame_id: String,
    pub intrinsics: Intrinsics,
    /// Camera → reference frame
    pub extrinsics: Extrinsics,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_id: PALM_FRAME.to_string(),
            intrinsics: Intrinsics::default(),
            extrinsics: Extrinsics::default(),
        }
    }
}

impl CameraConfig {
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::new(self.intrinsics, &self.extrinsics)
    }
}

/// Threaded runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Capacity of the single intake queue (events beyond it are dropped)
    pub queue_capacity: usize,
    /// Capacity of the estimate output channel
    pub output_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            output_capacity: 64,
        }
    }
}

/// All tunables, supplied at startup and immutable during a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub adapter: AdapterConfig,
    pub projector: ProjectorConfig,
    pub filter: EstimatorConfig,
    pub track: TrackManagerConfig,
    pub publisher: PublisherConfig,
    pub camera: CameraConfig,
    pub node: NodeConfig,
}

impl FusionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| FusionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FusionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FusionError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let range = &self.adapter.range;
        ensure(range.noise_std > 0.0, "adapter.range.noise_std must be positive")?;
        ensure(
            range.min_range >= 0.0 && range.max_range > range.min_range,
            "adapter.range requires 0 <= min_range < max_range",
        )?;
        ensure(
            self.adapter.detection_pixel_std > 0.0,
            "adapter.detection_pixel_std must be positive",
        )?;
        ensure(
            self.projector.staleness_window >= 0.0,
            "projector.staleness_window must be non-negative",
        )?;
        ensure(
            self.projector.stale_variance_factor >= 1.0,
            "projector.stale_variance_factor must be at least 1",
        )?;
        ensure(
            self.filter.kf.process_noise_density >= 0.0,
            "filter.process_noise_density must be non-negative",
        )?;
        ensure(self.filter.init_vel_std > 0.0, "filter.init_vel_std must be positive")?;
        ensure(self.filter.max_cov_trace > 0.0, "filter.max_cov_trace must be positive")?;
        ensure(self.track.gate_threshold > 0.0, "track.gate_threshold must be positive")?;
        ensure(
            self.track.max_consecutive_rejections > 0,
            "track.max_consecutive_rejections must be at least 1",
        )?;
        ensure(
            self.track.timeout_no_detection > 0.0,
            "track.timeout_no_detection must be positive",
        )?;
        ensure(
            self.track.timeout_lost > self.track.timeout_no_detection,
            "track.timeout_lost must exceed track.timeout_no_detection",
        )?;
        ensure(
            self.track.timeout_reset > self.track.timeout_lost,
            "track.timeout_reset must exceed track.timeout_lost",
        )?;
        ensure(
            self.publisher.rate_hz.is_finite()
                && (MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.publisher.rate_hz),
            "publisher.rate_hz must be within [0.1, 1000]",
        )?;
        ensure(self.camera.intrinsics.is_valid(), "camera.intrinsics are invalid")?;
        ensure(self.camera.extrinsics.is_valid(), "camera.extrinsics are invalid")?;
        ensure(self.node.queue_capacity > 0, "node.queue_capacity must be positive")?;
        ensure(self.node.output_capacity > 0, "node.output_capacity must be positive")?;
        Ok(())
    }
}

fn ensure(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(FusionError::InvalidConfig(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FusionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = FusionConfig::from_toml_str(
            r#"
            [track]
            timeout_lost = 3.0

            [filter]
            process_noise_density = 0.5

            [camera.extrinsics]
            translation = [0.0, 0.02, 0.0]
            rpy = [0.0, 0.0, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.track.timeout_lost, 3.0);
        assert_eq!(cfg.track.timeout_no_detection, 0.5);
        assert_eq!(cfg.filter.kf.process_noise_density, 0.5);
        assert_eq!(cfg.camera.extrinsics.translation, [0.0, 0.02, 0.0]);
        assert_eq!(cfg.publisher, PublisherConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = FusionConfig::default();
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(FusionConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn rejects_inverted_timeouts() {
        let err = FusionConfig::from_toml_str("[track]\ntimeout_lost = 0.1\n").unwrap_err();
        assert!(matches!(err, FusionError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_out_of_band_publish_rate() {
        for rate in [0.0, 1e-20, 1e6, f64::INFINITY] {
            let mut cfg = FusionConfig::default();
            cfg.publisher.rate_hz = rate;
            assert!(
                matches!(cfg.validate(), Err(FusionError::InvalidConfig(_))),
                "rate {rate} accepted"
            );
        }
    }

    #[test]
    fn rejects_reset_before_lost() {
        let err = FusionConfig::from_toml_str("[track]\ntimeout_reset = 1.0\n").unwrap_err();
        assert!(matches!(err, FusionError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = FusionConfig::from_toml_str("[track\n").unwrap_err();
        assert!(matches!(err, FusionError::Config(_)));
    }
}
