//! `fusion_core`: single-apple fusion filter for the palm camera.
//!
//! # Module layout
//! - [`types`]: State aliases, raw inputs, measurements, projections
//! - [`error`]: Error taxonomy (all per-measurement errors are non-fatal)
//! - [`adapter`]: Measurement adapter: noise, validation, per-source order
//! - [`projector`]: Detection + range → 3D position hypothesis
//! - [`kf`]: Constant-velocity Kalman filter, Joseph update, health check
//! - [`gating`]: Mahalanobis gating
//! - [`track`]: Track state and status machine
//! - [`estimator`]: Sole owner of the track belief
//! - [`track_manager`]: Initiation / gating / coasting / loss policy
//! - [`publisher`]: Fixed-rate estimate output
//! - [`pipeline`]: Single-owner orchestrator
//! - [`node`]: Threaded runtime: intake queue, ticker, owner thread
//! - [`config`]: TOML configuration
//! - [`metrics`]: RMSE, status occupancy, NEES against ground truth

pub mod adapter;
pub mod config;
pub mod error;
pub mod estimator;
pub mod gating;
pub mod kf;
pub mod metrics;
pub mod node;
pub mod pipeline;
pub mod projector;
pub mod publisher;
pub mod track;
pub mod track_manager;
pub mod types;

pub use config::FusionConfig;
pub use error::{FusionError, Result};
pub use node::{DetectionIntake, FusionNode, RangeIntake};
pub use pipeline::{Disposition, FusionPipeline, FusionStats};
pub use publisher::{EstimateSink, FusedEstimate};
pub use track::{TrackState, TrackStatus};
pub use types::{Measurement, PixelBox, Projection, RawInput, StateCov, StateVec, Timestamp};
