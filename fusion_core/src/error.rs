//! Error taxonomy of the fusion core.
//!
//! Nothing here is fatal to the process: per-measurement errors are counted
//! and logged, and the pipeline keeps publishing an honestly labeled estimate.

use crate::types::SourceKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// Out-of-order or too-old reading. Dropped.
    #[error("stale {sensor} input at t={stamp:.3}s (latest t={latest:.3}s)")]
    StaleInput {
        sensor: SourceKind,
        stamp: f64,
        latest: f64,
    },

    /// Malformed reading (non-finite, out of sensor band, degenerate box). Dropped.
    #[error("invalid {sensor} input: {reason}")]
    InvalidInput {
        sensor: SourceKind,
        reason: String,
    },

    /// Projection statistically inconsistent with the track. Dropped.
    #[error("gated outlier: d²={d2:.2} exceeds {threshold:.2}")]
    GatedOutlier { d2: f64, threshold: f64 },

    /// Sustained absence of projections; surfaced through track status.
    #[error("no projection for {elapsed:.3}s (limit {limit:.3}s)")]
    SensorTimeout { elapsed: f64, limit: f64 },

    /// Mean or covariance became invalid. Forces re-initialization.
    #[error("numeric corruption: {0}")]
    NumericCorruption(String),

    /// Innovation covariance not positive definite.
    #[error("innovation covariance is singular")]
    SingularInnovation,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    Config(String),

    /// The node's owner thread is gone.
    #[error("fusion node has shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, FusionError>;
