//! Replay: recorded sensor streams plus ground truth, as JSON.

use crate::sensor_sim::TimedInput;
use fusion_core::metrics::GroundTruth;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub duration: f64,
    /// All sensor inputs, sorted by arrival time
    pub inputs: Vec<TimedInput>,
    /// True apple state sampled on the simulation step
    pub ground_truth: Vec<GroundTruth>,
}

impl ReplayLog {
    /// Ground truth at `t`, linearly interpolated between samples.
    /// `None` outside the recorded span.
    pub fn truth_at(&self, t: f64) -> Option<GroundTruth> {
        let idx = self.ground_truth.partition_point(|g| g.time <= t);
        if idx == 0 {
            return None;
        }
        let before = &self.ground_truth[idx - 1];
        let Some(after) = self.ground_truth.get(idx) else {
            return (t == before.time).then_some(*before);
        };
        let span = after.time - before.time;
        let w = if span > 0.0 { (t - before.time) / span } else { 0.0 };
        Some(GroundTruth {
            time: t,
            position: before.position.lerp(&after.position, w),
            velocity: before.velocity.lerp(&after.velocity, w),
        })
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use fusion_core::types::{PosVec, RawInput};

    fn log() -> ReplayLog {
        let truth = |t: f64| GroundTruth {
            time: t,
            position: PosVec::new(0.0, 0.0, 0.5 - 0.25 * t),
            velocity: PosVec::new(0.0, 0.0, -0.25),
        };
        ReplayLog {
            scenario_name: "test".into(),
            seed: 1,
            duration: 1.0,
            inputs: vec![TimedInput {
                arrival: 0.01,
                input: RawInput::Range {
                    distance: 0.5,
                    stamp: 0.0,
                },
            }],
            ground_truth: vec![truth(0.0), truth(0.5), truth(1.0)],
        }
    }

    #[test]
    fn interpolates_truth() {
        let log = log();
        let g = log.truth_at(0.25).unwrap();
        assert_abs_diff_eq!(g.position.z, 0.4375, epsilon = 1e-12);
        assert_eq!(log.truth_at(1.0).map(|g| g.time), Some(1.0));
        assert!(log.truth_at(-0.1).is_none());
        assert!(log.truth_at(1.5).is_none());
    }

    #[test]
    fn json_file_round_trip() {
        let log = log();
        let path = std::env::temp_dir().join(format!("applevision-replay-{}.json", std::process::id()));
        save_replay(&log, &path).unwrap();
        let loaded = load_replay(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, log);
    }
}
