//! `sim`: Scenario simulator: apple motion, camera and range sensors, replay.

pub mod replay;
pub mod runner;
pub mod scenarios;
pub mod sensor_sim;
pub mod target;

pub use replay::{load_replay, save_replay, ReplayLog};
pub use runner::{evaluate, RunSummary};
pub use scenarios::{Scenario, ScenarioKind};
pub use sensor_sim::{CameraSimulator, RangeSimulator, TimedInput};
pub use target::{Apple, MotionSpec};
