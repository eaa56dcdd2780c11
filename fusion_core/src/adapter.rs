//! Measurement adapter: turns raw bridge/vision inputs into [`Measurement`]s.
//!
//! Normalization only: attaches the configured nominal noise, validates the
//! values and enforces per-source timestamp order. No filtering happens here.

use crate::{
    error::{FusionError, Result},
    types::{DetectionReading, Measurement, RangeReading, RawInput, SourceKind, Timestamp},
};
use sensor_models::RangeSensorParams;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Nominal noise characteristics of each source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Std deviation of the detected box center along each image axis (pixels)
    pub detection_pixel_std: f64,
    /// Detections scoring below this are treated as "no detection"
    pub min_confidence: f64,
    /// Range sensor band and noise
    pub range: RangeSensorParams,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            detection_pixel_std: 4.0,
            min_confidence: 0.0,
            range: RangeSensorParams::default(),
        }
    }
}

/// Stamps and normalizes readings from both sources.
#[derive(Debug)]
pub struct MeasurementAdapter {
    pub config: AdapterConfig,
    last_range: Option<Timestamp>,
    last_detection: Option<Timestamp>,
}

impl MeasurementAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            last_range: None,
            last_detection: None,
        }
    }

    /// Normalize one raw input. Rejected inputs are returned as errors and
    /// leave the adapter's per-source clock untouched.
    pub fn adapt(&mut self, raw: RawInput) -> Result<Measurement> {
        let source = raw.source();
        let stamp = raw.stamp();
        if !stamp.is_finite() {
            return Err(invalid(source, "non-finite timestamp".into()));
        }
        self.check_order(source, stamp)?;

        let measurement = match raw {
            RawInput::Range { distance, stamp } => {
                if !self.config.range.accepts(distance) {
                    return Err(invalid(
                        source,
                        format!(
                            "distance {distance} outside [{}, {}] m",
                            self.config.range.min_range, self.config.range.max_range
                        ),
                    ));
                }
                Measurement::Range(RangeReading {
                    distance,
                    variance: self.config.range.variance(),
                    timestamp: stamp,
                })
            }
            RawInput::Detection {
                pixel_box,
                confidence,
                stamp,
            } => {
                if !pixel_box.is_valid() || !confidence.is_finite() {
                    return Err(invalid(source, format!("degenerate box {pixel_box:?}")));
                }
                if confidence < self.config.min_confidence {
                    Measurement::NoDetection { timestamp: stamp }
                } else {
                    let std = self.config.detection_pixel_std;
                    Measurement::Detection(DetectionReading {
                        pixel_box,
                        confidence,
                        pixel_variance: std * std,
                        timestamp: stamp,
                    })
                }
            }
            RawInput::NoDetection { stamp } => Measurement::NoDetection { timestamp: stamp },
        };

        *self.clock(source) = Some(stamp);
        Ok(measurement)
    }

    fn check_order(&mut self, source: SourceKind, stamp: Timestamp) -> Result<()> {
        if let Some(latest) = *self.clock(source) {
            if stamp < latest {
                warn!(%source, stamp, latest, "dropping out-of-order input");
                return Err(FusionError::StaleInput {
                    sensor: source,
                    stamp,
                    latest,
                });
            }
        }
        Ok(())
    }

    fn clock(&mut self, source: SourceKind) -> &mut Option<Timestamp> {
        match source {
            SourceKind::Range => &mut self.last_range,
            SourceKind::Detection => &mut self.last_detection,
        }
    }
}

fn invalid(sensor: SourceKind, reason: String) -> FusionError {
    FusionError::InvalidInput { sensor, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelBox;

    fn detection(stamp: f64, confidence: f64) -> RawInput {
        RawInput::Detection {
            pixel_box: PixelBox::new(300.0, 160.0, 40.0, 40.0),
            confidence,
            stamp,
        }
    }

    #[test]
    fn attaches_nominal_noise() {
        let mut adapter = MeasurementAdapter::new(AdapterConfig::default());
        match adapter.adapt(RawInput::Range { distance: 0.5, stamp: 1.0 }).unwrap() {
            Measurement::Range(r) => {
                assert_eq!(r.distance, 0.5);
                assert!((r.variance - 1e-4).abs() < 1e-15);
            }
            other => panic!("unexpected {other:?}"),
        }
        match adapter.adapt(detection(1.0, 0.9)).unwrap() {
            Measurement::Detection(d) => assert_eq!(d.pixel_variance, 16.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_order_is_stale_per_source() {
        let mut adapter = MeasurementAdapter::new(AdapterConfig::default());
        adapter.adapt(RawInput::Range { distance: 0.5, stamp: 2.0 }).unwrap();
        // Older detection is fine: sources have independent clocks.
        adapter.adapt(detection(1.0, 0.9)).unwrap();

        let err = adapter
            .adapt(RawInput::Range { distance: 0.5, stamp: 1.5 })
            .unwrap_err();
        assert!(matches!(err, FusionError::StaleInput { sensor: SourceKind::Range, .. }));

        // No-detection shares the detection clock.
        let err = adapter.adapt(RawInput::NoDetection { stamp: 0.5 }).unwrap_err();
        assert!(matches!(err, FusionError::StaleInput { sensor: SourceKind::Detection, .. }));
    }

    #[test]
    fn rejects_invalid_readings() {
        let mut adapter = MeasurementAdapter::new(AdapterConfig::default());
        assert!(adapter.adapt(RawInput::Range { distance: -1.0, stamp: 0.0 }).is_err());
        assert!(adapter.adapt(RawInput::Range { distance: f64::NAN, stamp: 0.0 }).is_err());
        let bad_box = RawInput::Detection {
            pixel_box: PixelBox::new(0.0, 0.0, 0.0, 10.0),
            confidence: 0.9,
            stamp: 0.0,
        };
        assert!(matches!(
            adapter.adapt(bad_box),
            Err(FusionError::InvalidInput { .. })
        ));
        // Rejections do not advance the clock.
        adapter.adapt(RawInput::Range { distance: 0.5, stamp: 0.0 }).unwrap();
    }

    #[test]
    fn low_confidence_becomes_no_detection() {
        let mut adapter = MeasurementAdapter::new(AdapterConfig {
            min_confidence: 0.5,
            ..Default::default()
        });
        assert_eq!(
            adapter.adapt(detection(0.0, 0.2)).unwrap(),
            Measurement::NoDetection { timestamp: 0.0 }
        );
    }
}
