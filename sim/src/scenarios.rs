//! Scenario definitions.
//!
//! Each scenario is one apple, one palm camera and one range sensor.
//! All scenarios are deterministic given the same seed.

use crate::{
    replay::ReplayLog,
    sensor_sim::{CameraSimParams, CameraSimulator, RangeSimParams, RangeSimulator},
    target::{Apple, MotionSpec},
};
use sensor_models::PinholeCamera;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Still apple, clean sensors
    Steady,
    /// Gripper closing in on a still apple
    Approach,
    /// Apple swaying on its branch
    Sway,
    /// Detections vanish for 1 s (coast, then recover)
    Occlusion,
    /// Detections vanish for 3 s while the apple moves (lost, then re-init)
    LongLoss,
    /// Background false positives far from the apple
    Clutter,
    /// Serial link silent for 2 s while approaching
    RangeDropout,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::Steady,
        ScenarioKind::Approach,
        ScenarioKind::Sway,
        ScenarioKind::Occlusion,
        ScenarioKind::LongLoss,
        ScenarioKind::Clutter,
        ScenarioKind::RangeDropout,
    ];
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // truth integration step (s)
    pub apple: Apple,
    pub camera: CameraSimParams,
    pub range: RangeSimParams,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        let base = Scenario {
            name: String::new(),
            seed,
            duration: 10.0,
            sim_dt: 1.0 / 300.0,
            apple: Apple::new([0.02, -0.01, 0.45], MotionSpec::Stationary),
            camera: CameraSimParams::default(),
            range: RangeSimParams::default(),
        };
        match kind {
            ScenarioKind::Steady => Scenario {
                name: "steady".into(),
                ..base
            },
            ScenarioKind::Approach => Scenario {
                name: "approach".into(),
                duration: 6.0,
                apple: Apple::new(
                    [0.01, 0.0, 0.6],
                    MotionSpec::ConstantVelocity {
                        velocity: [0.0, 0.0, -0.05],
                    },
                ),
                ..base
            },
            ScenarioKind::Sway => Scenario {
                name: "sway".into(),
                apple: Apple::new(
                    [0.0, 0.0, 0.5],
                    MotionSpec::Sway {
                        amplitude: [0.03, 0.01, 0.0],
                        frequency: 0.5,
                    },
                ),
                ..base
            },
            ScenarioKind::Occlusion => Scenario {
                name: "occlusion".into(),
                camera: CameraSimParams {
                    occlusions: vec![(3.0, 4.0)],
                    ..base.camera.clone()
                },
                ..base
            },
            ScenarioKind::LongLoss => Scenario {
                name: "long_loss".into(),
                apple: Apple::new(
                    [0.02, -0.01, 0.45],
                    MotionSpec::Segmented {
                        segments: vec![
                            (0.0, Box::new(MotionSpec::Stationary)),
                            (
                                3.5,
                                Box::new(MotionSpec::ConstantVelocity {
                                    velocity: [0.04, 0.0, 0.0],
                                }),
                            ),
                            (4.5, Box::new(MotionSpec::Stationary)),
                        ],
                    },
                ),
                camera: CameraSimParams {
                    occlusions: vec![(3.0, 6.0)],
                    ..base.camera.clone()
                },
                ..base
            },
            ScenarioKind::Clutter => Scenario {
                name: "clutter".into(),
                camera: CameraSimParams {
                    false_positive_rate: 0.1,
                    ..base.camera.clone()
                },
                ..base
            },
            ScenarioKind::RangeDropout => Scenario {
                name: "range_dropout".into(),
                apple: Apple::new(
                    [0.0, 0.01, 0.5],
                    MotionSpec::ConstantVelocity {
                        velocity: [0.0, 0.0, -0.02],
                    },
                ),
                range: RangeSimParams {
                    dropouts: vec![(3.0, 5.0)],
                    ..base.range.clone()
                },
                ..base
            },
        }
    }

    /// Simulate the scenario through `camera` and record every sensor input
    /// with the ground truth.
    pub fn record(&self, camera: &PinholeCamera) -> ReplayLog {
        let mut apple = self.apple.clone();
        let mut camera_sim = CameraSimulator::new(self.camera.clone(), camera.clone(), self.seed);
        let mut range_sim =
            RangeSimulator::new(self.range.clone(), camera.clone(), self.seed.wrapping_add(1));

        let steps = (self.duration / self.sim_dt).round() as usize;
        let mut inputs = Vec::new();
        let mut ground_truth = Vec::with_capacity(steps + 1);

        for k in 0..=steps {
            let t = k as f64 * self.sim_dt;
            ground_truth.push(apple.truth(t));
            inputs.extend(camera_sim.poll(&apple, t));
            inputs.extend(range_sim.poll(&apple, t));
            apple.step(t, self.sim_dt);
        }
        // Stable: equal arrivals keep generation order.
        inputs.sort_by(|a, b| a.arrival.total_cmp(&b.arrival));
        debug!(scenario = %self.name, inputs = inputs.len(), "scenario recorded");

        ReplayLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            duration: self.duration,
            inputs,
            ground_truth,
        }
    }
}
