//! Apple motion relative to the palm camera.
//!
//! Positions live in the reference (palm) frame. Palm motion toward the fruit
//! is modeled as apple motion, which is all the fusion node can observe.

use fusion_core::metrics::GroundTruth;
use fusion_core::types::PosVec;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// How the apple moves over time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Hanging still
    Stationary,
    /// Constant relative velocity (m/s), e.g. the gripper approaching
    ConstantVelocity { velocity: [f64; 3] },
    /// Sinusoidal sway around the apple's anchor point
    Sway { amplitude: [f64; 3], frequency: f64 },
    /// Switch motion at given times. `segments` is sorted by start time;
    /// the active motion is the last one whose start is <= t.
    Segmented { segments: Vec<(f64, Box<MotionSpec>)> },
}

/// The simulated apple with its true state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Apple {
    pub position: PosVec,
    pub velocity: PosVec,
    /// Rest point for sway
    pub anchor: PosVec,
    /// Fruit radius (m); sets the apparent box size
    pub radius: f64,
    pub motion: MotionSpec,
}

impl Apple {
    pub fn new(position: [f64; 3], motion: MotionSpec) -> Self {
        let position = PosVec::from(position);
        Self {
            position,
            velocity: PosVec::zeros(),
            anchor: position,
            radius: 0.04,
            motion,
        }
    }

    /// Advance the true state from `t` to `t + dt`.
    pub fn step(&mut self, t: f64, dt: f64) {
        let motion = active_motion(&self.motion, t)
            .cloned()
            .unwrap_or(MotionSpec::Stationary);
        match motion {
            MotionSpec::Stationary => {
                self.velocity = PosVec::zeros();
                // Sway resumes around wherever the apple stopped.
                self.anchor = self.position;
            }
            MotionSpec::ConstantVelocity { velocity } => {
                self.velocity = PosVec::from(velocity);
                self.position += self.velocity * dt;
                self.anchor = self.position;
            }
            MotionSpec::Sway {
                amplitude,
                frequency,
            } => {
                let amp = PosVec::from(amplitude);
                let w = TAU * frequency;
                let phase = w * (t + dt);
                self.position = self.anchor + amp * phase.sin();
                self.velocity = amp * (w * phase.cos());
            }
            // Nested segment lists are flattened by `active_motion`.
            MotionSpec::Segmented { .. } => {
                self.position += self.velocity * dt;
            }
        }
    }

    pub fn truth(&self, time: f64) -> GroundTruth {
        GroundTruth {
            time,
            position: self.position,
            velocity: self.velocity,
        }
    }
}

/// Leaf motion in effect at `t`; `None` before the first segment starts.
fn active_motion(motion: &MotionSpec, t: f64) -> Option<&MotionSpec> {
    match motion {
        MotionSpec::Segmented { segments } => segments
            .iter()
            .filter(|(start, _)| *start <= t)
            .last()
            .and_then(|(_, inner)| active_motion(inner, t)),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_velocity_integrates() {
        let mut apple = Apple::new(
            [0.0, 0.0, 0.6],
            MotionSpec::ConstantVelocity {
                velocity: [0.0, 0.0, -0.05],
            },
        );
        for k in 0..100 {
            apple.step(k as f64 * 0.01, 0.01);
        }
        assert_abs_diff_eq!(apple.position.z, 0.55, epsilon = 1e-12);
        assert_abs_diff_eq!(apple.velocity.z, -0.05);
    }

    #[test]
    fn sway_oscillates_about_anchor() {
        let mut apple = Apple::new(
            [0.0, 0.0, 0.5],
            MotionSpec::Sway {
                amplitude: [0.03, 0.0, 0.0],
                frequency: 0.5,
            },
        );
        // Quarter period: peak displacement, zero velocity.
        let dt = 0.005;
        for k in 0..100 {
            apple.step(k as f64 * dt, dt);
        }
        assert_abs_diff_eq!(apple.position.x, 0.03, epsilon = 1e-9);
        assert_abs_diff_eq!(apple.velocity.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(apple.position.z, 0.5);
    }

    #[test]
    fn segments_switch_motion() {
        let mut apple = Apple::new(
            [0.0, 0.0, 0.5],
            MotionSpec::Segmented {
                segments: vec![
                    (0.0, Box::new(MotionSpec::Stationary)),
                    (
                        1.0,
                        Box::new(MotionSpec::ConstantVelocity {
                            velocity: [0.1, 0.0, 0.0],
                        }),
                    ),
                    (2.0, Box::new(MotionSpec::Stationary)),
                ],
            },
        );
        let dt = 0.01;
        for k in 0..300 {
            apple.step(k as f64 * dt, dt);
        }
        assert_abs_diff_eq!(apple.position.x, 0.1, epsilon = 1e-9);
        assert_eq!(apple.velocity, PosVec::zeros());
    }
}
