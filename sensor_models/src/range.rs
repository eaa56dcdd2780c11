//! Range sensor parameters (distance sensor behind the serial bridge).

use serde::{Deserialize, Serialize};

/// Working band and noise of the distance sensor behind the serial bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeSensorParams {
    /// Closest distance the sensor reports reliably (meters)
    pub min_range: f64,
    /// Farthest distance the sensor reports reliably (meters)
    pub max_range: f64,
    /// Measurement noise: range standard deviation (meters)
    pub noise_std: f64,
}

impl Default for RangeSensorParams {
    fn default() -> Self {
        Self {
            min_range: 0.02,
            max_range: 2.0,
            noise_std: 0.01, // 1 cm
        }
    }
}

impl RangeSensorParams {
    /// Range variance (m²).
    pub fn variance(&self) -> f64 {
        self.noise_std * self.noise_std
    }

    /// True if `distance` is a finite value inside the sensor's working band.
    pub fn accepts(&self, distance: f64) -> bool {
        distance.is_finite() && distance >= self.min_range && distance <= self.max_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_band_readings() {
        let params = RangeSensorParams::default();
        assert!(params.accepts(0.5));
        assert!(!params.accepts(0.0));
        assert!(!params.accepts(5.0));
        assert!(!params.accepts(f64::NAN));
    }
}
