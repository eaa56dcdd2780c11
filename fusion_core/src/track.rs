//! Track: the estimator's belief about the single tracked apple.

use crate::types::{PosCov, PosVec, StateCov, StateVec, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of the track.
///
/// ```text
/// UNINITIALIZED ──projection──▶ TRACKING ◀──projection── COASTING
///                                   │ timeout / reject streak ▲ │
///                                   └─────────────────────────┘ │ lost timeout
///                                   ▲                           ▼
///                                   └───────projection────── LOST
/// ```
/// Any state may fall back to UNINITIALIZED on numeric corruption, and LOST
/// does so after `timeout_reset` without a projection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    /// No belief yet (or discarded after corruption)
    #[default]
    Uninitialized,
    /// Receiving gated projections
    Tracking,
    /// Predicting through a measurement gap
    Coasting,
    /// Gap exceeded the lost timeout; next projection re-initializes
    Lost,
}

impl TrackStatus {
    /// True if `self → next` is an edge of the lifecycle state machine.
    pub fn can_transition_to(self, next: TrackStatus) -> bool {
        use TrackStatus::*;
        matches!(
            (self, next),
            (Uninitialized, Tracking)
                | (Tracking, Coasting)
                | (Coasting, Tracking)
                | (Coasting, Lost)
                | (Lost, Tracking)
                | (_, Uninitialized)
        )
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackStatus::Uninitialized => "UNINITIALIZED",
            TrackStatus::Tracking => "TRACKING",
            TrackStatus::Coasting => "COASTING",
            TrackStatus::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// The tracked object's state. Exactly one exists, owned by the estimator.
#[derive(Clone, Debug)]
pub struct TrackState {
    /// Estimated state vector [px,py,pz,vx,vy,vz]
    pub state: StateVec,
    /// State estimation covariance
    pub cov: StateCov,
    /// Time the mean refers to (advanced by every predict)
    pub timestamp: Timestamp,
    /// Time of the last measurement correction
    pub last_update_time: Timestamp,
    /// Lifecycle status
    pub status: TrackStatus,
    /// Total number of corrections since (re-)initialization
    pub total_updates: u32,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            state: StateVec::zeros(),
            cov: StateCov::zeros(),
            timestamp: 0.0,
            last_update_time: 0.0,
            status: TrackStatus::Uninitialized,
            total_updates: 0,
        }
    }
}

impl TrackState {
    /// Create a freshly initialized track from an initial state estimate.
    pub fn new(state: StateVec, cov: StateCov, birth_time: Timestamp) -> Self {
        Self {
            state,
            cov,
            timestamp: birth_time,
            last_update_time: birth_time,
            status: TrackStatus::Tracking,
            total_updates: 1,
        }
    }

    pub fn position(&self) -> PosVec {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn velocity(&self) -> PosVec {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    pub fn position_cov(&self) -> PosCov {
        self.cov.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn cov_trace(&self) -> f64 {
        self.cov.trace()
    }

    pub fn is_initialized(&self) -> bool {
        self.status != TrackStatus::Uninitialized
    }
}
