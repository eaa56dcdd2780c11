//! Mahalanobis gating: decides whether a projection is statistically
//! consistent with the predicted track.
//!
//! # Gating criterion
//! d²(z, track) = νᵀ S⁻¹ ν  where ν = z − H·x̂_pred,  S = H·P_pred·Hᵀ + R
//!
//! Accept if d² < χ²(p, dof) for confidence level p.
//!
//! # Gate threshold table
//! dof=3: χ²(0.99, 3) ≈ 11.34 (99% confidence ellipsoid, the default)

use crate::types::{PosCov, PosVec, StateCov, StateVec};

/// Pre-computed χ² gate thresholds indexed by dimension [1..=6].
/// Value at index `d` is χ²(0.99, d).
pub const CHI2_99: [f64; 7] = [0.0, 6.63, 9.21, 11.34, 13.28, 15.09, 16.81];

/// Result of a gate check for one projection.
#[derive(Clone, Debug)]
pub struct GateResult {
    /// Mahalanobis distance squared
    pub d2: f64,
    /// True if d² < gate threshold
    pub passes: bool,
    /// Innovation vector ν
    pub innovation: PosVec,
    /// Innovation covariance S
    pub innovation_cov: PosCov,
}

/// Check whether position `z` with noise `r` passes the Mahalanobis gate for
/// a predicted track state `(state, cov)`.
pub fn mahalanobis_gate(
    state: &StateVec,
    cov: &StateCov,
    z: &PosVec,
    r: &PosCov,
    gate_threshold: f64,
) -> GateResult {
    // Innovation ν = z − H·x, with H selecting position
    let innovation = z - state.fixed_rows::<3>(0);

    // Innovation covariance S = H·P·Hᵀ + R = P_pos + R
    let s = cov.fixed_view::<3, 3>(0, 0) + r;

    // Mahalanobis distance² = νᵀ S⁻¹ ν
    let d2 = match s.cholesky() {
        Some(chol) => {
            let v = chol.solve(&innovation);
            innovation.dot(&v)
        }
        None => f64::INFINITY, // degenerate: reject
    };

    GateResult {
        d2,
        passes: d2 < gate_threshold,
        innovation,
        innovation_cov: s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3, Vector6};

    fn simple_r(sigma: f64) -> PosCov {
        Matrix3::identity() * (sigma * sigma)
    }

    #[test]
    fn point_inside_gate() {
        let state = Vector6::new(0.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        let cov = StateCov::identity() * 1e-4;
        // Measurement right at prediction → d² ≈ 0
        let z = Vector3::new(0.0, 0.0, 0.5);
        let res = mahalanobis_gate(&state, &cov, &z, &simple_r(0.01), CHI2_99[3]);
        assert!(res.passes, "Point at track location must pass gate");
        assert!(res.d2 < 1e-9);
    }

    #[test]
    fn point_outside_gate() {
        let state = Vector6::new(0.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        // Small covariance → tight gate
        let cov = StateCov::identity() * 1e-4;
        // 30 cm off with ~1.4 cm combined std dev
        let z = Vector3::new(0.3, 0.0, 0.5);
        let res = mahalanobis_gate(&state, &cov, &z, &simple_r(0.01), CHI2_99[3]);
        assert!(!res.passes, "Distant point must fail gate");
        assert!((res.d2 - 0.09 / 2e-4).abs() < 1e-6);
    }

    #[test]
    fn degenerate_covariance_rejects() {
        let res = mahalanobis_gate(
            &StateVec::zeros(),
            &StateCov::zeros(),
            &Vector3::zeros(),
            &Matrix3::zeros(),
            CHI2_99[3],
        );
        assert!(!res.passes);
        assert!(res.d2.is_infinite());
    }
}
