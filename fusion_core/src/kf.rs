//! Kalman filter: predict and update steps, plus covariance health checks.
//!
//! # Design choices
//! - **Linear KF** with a constant-velocity (CV) motion model. Projections are
//!   already 3D positions, so the observation model is linear.
//! - All math is done in `f64` via `nalgebra` fixed-size matrices.
//! - The `KalmanFilter` trait is the seam for swapping the motion model
//!   (e.g. constant acceleration) once tuned against real sensor data.
//!
//! ## State vector
//! x = [px, py, pz, vx, vy, vz]ᵀ  (6-dimensional)
//!
//! ## CV Transition model
//! F = I₆ + dt * [[0₃ I₃]; [0₃ 0₃]]
//! i.e. px += vx*dt, etc.
//!
//! ## Process noise Q (continuous white-noise acceleration)
//! Per axis, with spectral density q:
//! Q = q * [[dt³/3, dt²/2], [dt²/2, dt]]
//! Two predictions of dt₁ and dt₂ equal one prediction of dt₁ + dt₂.

use crate::error::{FusionError, Result};
use crate::types::{PosCov, PosVec, StateCov, StateVec};
use nalgebra::{Matrix3x6, Matrix6, Matrix6x3, SymmetricEigen};
use sensor_models::PositionObservation;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for a Kalman filter model (predict + update).
pub trait KalmanFilter {
    /// Predict state and covariance forward by `dt` seconds.
    fn predict(&self, state: &StateVec, cov: &StateCov, dt: f64) -> (StateVec, StateCov);

    /// Update state and covariance given a 3D position observation `z` with
    /// noise `r`.
    fn update(&self, state: &StateVec, cov: &StateCov, z: &PosVec, r: &PosCov)
        -> Result<KfUpdateResult>;
}

/// Result of a KF update step.
#[derive(Clone, Debug)]
pub struct KfUpdateResult {
    pub state: StateVec,
    pub cov: StateCov,
    /// Innovation ν = z − H·x
    pub innovation: PosVec,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub innovation_cov: PosCov,
    /// Kalman gain K
    pub kalman_gain: Matrix6x3<f64>,
}

// ---------------------------------------------------------------------------
// Constant Velocity model
// ---------------------------------------------------------------------------

/// Configuration for the CV Kalman filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvKfConfig {
    /// Acceleration noise spectral density (m²/s³). Covers fruit sway and
    /// gripper motion the CV model does not describe.
    pub process_noise_density: f64,
}

impl Default for CvKfConfig {
    fn default() -> Self {
        Self {
            process_noise_density: 0.1,
        }
    }
}

/// Constant-Velocity Kalman filter (6-state, linear).
#[derive(Clone, Debug)]
pub struct CvKalmanFilter {
    pub config: CvKfConfig,
    observation: PositionObservation,
}

impl CvKalmanFilter {
    pub fn new(config: CvKfConfig) -> Self {
        Self {
            config,
            observation: PositionObservation,
        }
    }

    /// Build state transition matrix F for timestep dt.
    pub fn transition_matrix(dt: f64) -> Matrix6<f64> {
        let mut f = Matrix6::<f64>::identity();
        // position += velocity * dt
        f[(0, 3)] = dt;
        f[(1, 4)] = dt;
        f[(2, 5)] = dt;
        f
    }

    /// Build process noise matrix Q for timestep dt.
    pub fn process_noise(dt: f64, q: f64) -> Matrix6<f64> {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;

        let mut qm = Matrix6::<f64>::zeros();
        for i in 0..3usize {
            qm[(i, i)] = q * dt3 / 3.0;
            qm[(i + 3, i + 3)] = q * dt;
            qm[(i, i + 3)] = q * dt2 / 2.0;
            qm[(i + 3, i)] = q * dt2 / 2.0;
        }
        qm
    }

    fn h(&self) -> Matrix3x6<f64> {
        self.observation.h_matrix()
    }
}

impl KalmanFilter for CvKalmanFilter {
    fn predict(&self, state: &StateVec, cov: &StateCov, dt: f64) -> (StateVec, StateCov) {
        let f = Self::transition_matrix(dt);
        let q = Self::process_noise(dt, self.config.process_noise_density);
        let predicted_state = f * state;
        let predicted_cov = symmetrize(&(f * cov * f.transpose() + q));
        (predicted_state, predicted_cov)
    }

    fn update(
        &self,
        state: &StateVec,
        cov: &StateCov,
        z: &PosVec,
        r: &PosCov,
    ) -> Result<KfUpdateResult> {
        let h = self.h();

        // Innovation: ν = z − H·x
        let innovation = z - self.observation.apply(state);

        // Innovation covariance: S = H·P·Hᵀ + R
        let s = symmetrize3(&(h * cov * h.transpose() + r));

        // Kalman gain: K = P·Hᵀ·S⁻¹  (Cholesky doubles as a PD check on S)
        let s_inv = s
            .cholesky()
            .ok_or(FusionError::SingularInnovation)?
            .inverse();
        let k = cov * h.transpose() * s_inv;

        // Updated state: x' = x + K·ν
        let new_state = state + k * innovation;

        // Updated covariance: Joseph form P' = (I−KH)·P·(I−KH)ᵀ + K·R·Kᵀ
        let i_kh = Matrix6::<f64>::identity() - k * h;
        let new_cov = symmetrize(&(i_kh * cov * i_kh.transpose() + k * r * k.transpose()));

        Ok(KfUpdateResult {
            state: new_state,
            cov: new_cov,
            innovation,
            innovation_cov: s,
            kalman_gain: k,
        })
    }
}

// ---------------------------------------------------------------------------
// Numeric hygiene
// ---------------------------------------------------------------------------

/// (P + Pᵀ) / 2
pub fn symmetrize(p: &StateCov) -> StateCov {
    (p + p.transpose()) * 0.5
}

fn symmetrize3(p: &PosCov) -> PosCov {
    (p + p.transpose()) * 0.5
}

/// Relative tolerance for negative eigenvalues caused by round-off.
const PSD_TOLERANCE: f64 = 1e-9;

/// Reject a mean/covariance pair that is non-finite, not positive
/// semi-definite, or whose trace exceeds `max_trace`.
pub fn check_health(state: &StateVec, cov: &StateCov, max_trace: f64) -> Result<()> {
    if state.iter().any(|v| !v.is_finite()) {
        return Err(FusionError::NumericCorruption("non-finite state mean".into()));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(FusionError::NumericCorruption("non-finite covariance".into()));
    }
    let trace = cov.trace();
    if trace > max_trace {
        return Err(FusionError::NumericCorruption(format!(
            "covariance trace {trace:.3e} exceeds {max_trace:.3e}"
        )));
    }
    let min_eig = SymmetricEigen::new(symmetrize(cov)).eigenvalues.min();
    if min_eig < -PSD_TOLERANCE * trace.max(1.0) {
        return Err(FusionError::NumericCorruption(format!(
            "covariance not positive semi-definite (min eigenvalue {min_eig:.3e})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
