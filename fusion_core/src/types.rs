//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use sensor_models::PixelBox;

// ---------------------------------------------------------------------------
// Scalar type: use f64 throughout for numerical precision in Kalman filter.
// ---------------------------------------------------------------------------

/// 6-DOF state vector: [px, py, pz, vx, vy, vz]
pub type StateVec = Vector6<f64>;

/// 6×6 state covariance matrix
pub type StateCov = Matrix6<f64>;

/// 3D position in the reference frame (meters)
pub type PosVec = Vector3<f64>;

/// 3×3 position covariance (m²)
pub type PosCov = Matrix3<f64>;

/// Timestamps are seconds on the node's monotonic clock.
pub type Timestamp = f64;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Which independent input stream a reading came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Serial distance sensor
    Range,
    /// Vision detector (boxes and explicit no-detection signals)
    Detection,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Range => write!(f, "range"),
            SourceKind::Detection => write!(f, "detection"),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw inputs (what the collaborators hand us)
// ---------------------------------------------------------------------------

/// Un-normalized input as delivered by the serial bridge or vision node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawInput {
    /// Scalar distance (meters)
    Range { distance: f64, stamp: Timestamp },
    /// Best bounding box of the current frame
    Detection {
        pixel_box: PixelBox,
        confidence: f64,
        stamp: Timestamp,
    },
    /// The detector ran on a frame and found nothing
    NoDetection { stamp: Timestamp },
}

impl RawInput {
    pub fn stamp(&self) -> Timestamp {
        match self {
            RawInput::Range { stamp, .. }
            | RawInput::Detection { stamp, .. }
            | RawInput::NoDetection { stamp } => *stamp,
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            RawInput::Range { .. } => SourceKind::Range,
            RawInput::Detection { .. } | RawInput::NoDetection { .. } => SourceKind::Detection,
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// A range reading with its noise variance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    /// Distance along the camera's viewing ray (meters)
    pub distance: f64,
    /// Range variance (m²)
    pub variance: f64,
    pub timestamp: Timestamp,
}

/// A detection box with its pixel noise variance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReading {
    pub pixel_box: PixelBox,
    /// Detector score in [0, 1]
    pub confidence: f64,
    /// Variance of the box center along each image axis (px²)
    pub pixel_variance: f64,
    pub timestamp: Timestamp,
}

/// Normalized, timestamped measurement. Produced by the adapter and consumed
/// exactly once by the pipeline (moved, never cloned on the hot path).
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Range(RangeReading),
    Detection(DetectionReading),
    /// Explicit "no detection" for a processed frame
    NoDetection { timestamp: Timestamp },
}

impl Measurement {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Measurement::Range(r) => r.timestamp,
            Measurement::Detection(d) => d.timestamp,
            Measurement::NoDetection { timestamp } => *timestamp,
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            Measurement::Range(_) => SourceKind::Range,
            Measurement::Detection(_) | Measurement::NoDetection { .. } => SourceKind::Detection,
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// How the range used by a projection relates to its detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionSource {
    /// Range reading inside the staleness window
    Fresh,
    /// Last-known range outside the window; depth variance inflated
    RangeStale,
}

/// 3D position hypothesis in the reference frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub position: PosVec,
    pub covariance: PosCov,
    /// Never earlier than the detection or range it derives from
    pub timestamp: Timestamp,
    pub source: ProjectionSource,
    /// |detection time − range time| (seconds)
    pub range_age: f64,
}
