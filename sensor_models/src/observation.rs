//! Observation model for fused 3D position hypotheses.
//!
//! A projection already lives in the reference frame, so the observation is
//! linear: z = [px, py, pz] = H·x with H = [I₃ 0₃].

use nalgebra::{Matrix3x6, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Direct 3D position observation of a [px,py,pz,vx,vy,vz] state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PositionObservation;

impl PositionObservation {
    /// Observation matrix H (constant).
    pub fn h_matrix(&self) -> Matrix3x6<f64> {
        Matrix3x6::new(
            1., 0., 0., 0., 0., 0.,
            0., 1., 0., 0., 0., 0.,
            0., 0., 1., 0., 0., 0.,
        )
    }

    /// Map state to expected measurement h(x).
    pub fn apply(&self, state: &Vector6<f64>) -> Vector3<f64> {
        state.fixed_rows::<3>(0).into_owned()
    }
}
