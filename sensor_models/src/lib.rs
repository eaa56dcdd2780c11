//! `sensor_models`: Palm camera geometry, range-sensor parameters and the
//! 3D position observation model.

pub mod camera;
pub mod observation;
pub mod range;

pub use camera::{Extrinsics, Intrinsics, PinholeCamera, PixelBox, PALM_FRAME};
pub use observation::PositionObservation;
pub use range::RangeSensorParams;
