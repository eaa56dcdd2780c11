//! Palm camera detector and serial range sensor simulators.
//!
//! Both produce [`RawInput`]s stamped at sampling time, with an arrival time
//! that models processing and transport latency. Each has its own seeded
//! ChaCha stream so one sensor's draws never perturb the other's.

use crate::target::Apple;
use fusion_core::types::{PixelBox, RawInput};
use nalgebra::Point3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use sensor_models::PinholeCamera;
use serde::{Deserialize, Serialize};

/// A raw input with the time it reaches the fusion node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedInput {
    pub arrival: f64,
    pub input: RawInput,
}

fn in_window(windows: &[(f64, f64)], t: f64) -> bool {
    windows.iter().any(|&(start, end)| t >= start && t < end)
}

fn gaussian(rng: &mut ChaCha8Rng, std: f64) -> f64 {
    let n: f64 = rng.sample(StandardNormal);
    n * std
}

// ---------------------------------------------------------------------------
// Camera / detector
// ---------------------------------------------------------------------------

/// Detector behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSimParams {
    /// Frames per second
    pub rate_hz: f64,
    /// Std deviation of the reported box center (px)
    pub pixel_noise_std: f64,
    /// Probability the apple is detected when visible
    pub p_detection: f64,
    /// Per-frame probability that the best box is background clutter
    pub false_positive_rate: f64,
    /// Clutter only appears after this time (s)
    pub false_positive_after: f64,
    /// Clutter boxes are at least this far from the apple (px)
    pub false_positive_min_offset: f64,
    /// Frame-to-output latency (s)
    pub latency: f64,
    /// Intervals during which the apple is hidden
    pub occlusions: Vec<(f64, f64)>,
}

impl Default for CameraSimParams {
    fn default() -> Self {
        Self {
            rate_hz: 30.0,
            pixel_noise_std: 2.0,
            p_detection: 0.97,
            false_positive_rate: 0.0,
            false_positive_after: 1.0,
            false_positive_min_offset: 120.0,
            latency: 0.02,
            occlusions: Vec::new(),
        }
    }
}

/// Generates one detector output per frame.
pub struct CameraSimulator {
    pub params: CameraSimParams,
    camera: PinholeCamera,
    next_frame: f64,
    rng: ChaCha8Rng,
}

impl CameraSimulator {
    pub fn new(params: CameraSimParams, camera: PinholeCamera, seed: u64) -> Self {
        Self {
            params,
            camera,
            next_frame: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Emit the frame due at or before `t`, if any.
    pub fn poll(&mut self, apple: &Apple, t: f64) -> Option<TimedInput> {
        if t < self.next_frame {
            return None;
        }
        self.next_frame += 1.0 / self.params.rate_hz;

        let input = self.frame(apple, t);
        Some(TimedInput {
            arrival: t + self.params.latency,
            input,
        })
    }

    fn frame(&mut self, apple: &Apple, t: f64) -> RawInput {
        let visible = self.apple_box(apple);

        if t >= self.params.false_positive_after
            && self.rng.gen::<f64>() < self.params.false_positive_rate
        {
            if let Some(pixel_box) = self.clutter_box(visible.as_ref()) {
                return RawInput::Detection {
                    pixel_box,
                    confidence: self.rng.gen_range(0.5..0.9),
                    stamp: t,
                };
            }
        }

        let detected = !in_window(&self.params.occlusions, t)
            && self.rng.gen::<f64>() < self.params.p_detection;
        match visible {
            Some(pixel_box) if detected => {
                let (u, v) = pixel_box.center();
                let std = self.params.pixel_noise_std;
                let noisy = PixelBox::centered(
                    u + gaussian(&mut self.rng, std),
                    v + gaussian(&mut self.rng, std),
                    pixel_box.w,
                    pixel_box.h,
                );
                RawInput::Detection {
                    pixel_box: noisy,
                    confidence: self.rng.gen_range(0.6..0.99),
                    stamp: t,
                }
            }
            _ => RawInput::NoDetection { stamp: t },
        }
    }

    /// Noise-free box of the apple, if its center is inside the image.
    fn apple_box(&self, apple: &Apple) -> Option<PixelBox> {
        let p_cam = self.camera.from_reference(&Point3::from(apple.position));
        let (u, v) = self.camera.project(&p_cam)?;
        let k = &self.camera.intrinsics;
        if u < 0.0 || v < 0.0 || u >= k.width as f64 || v >= k.height as f64 {
            return None;
        }
        let diameter = k.fx * 2.0 * apple.radius / p_cam.z;
        Some(PixelBox::centered(u, v, diameter, diameter))
    }

    fn clutter_box(&mut self, apple: Option<&PixelBox>) -> Option<PixelBox> {
        let k = self.camera.intrinsics;
        for _ in 0..16 {
            let u = self.rng.gen_range(0.0..k.width as f64);
            let v = self.rng.gen_range(0.0..k.height as f64);
            let far = apple.map_or(true, |b| {
                let (au, av) = b.center();
                (u - au).hypot(v - av) >= self.params.false_positive_min_offset
            });
            if far {
                let size = self.rng.gen_range(20.0..80.0);
                return Some(PixelBox::centered(u, v, size, size));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Range sensor
// ---------------------------------------------------------------------------

/// Serial distance sensor behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeSimParams {
    /// Nominal readings per second
    pub rate_hz: f64,
    /// Period jitter as a fraction of the nominal period (uniform ±)
    pub period_jitter: f64,
    /// Std deviation of the reported distance (m)
    pub noise_std: f64,
    /// Serial transport latency (s)
    pub latency: f64,
    /// Intervals during which the serial link is silent
    pub dropouts: Vec<(f64, f64)>,
}

impl Default for RangeSimParams {
    fn default() -> Self {
        Self {
            rate_hz: 30.0,
            period_jitter: 0.2,
            noise_std: 0.01,
            latency: 0.005,
            dropouts: Vec::new(),
        }
    }
}

/// Generates range readings on an irregular schedule.
pub struct RangeSimulator {
    pub params: RangeSimParams,
    camera: PinholeCamera,
    next_reading: f64,
    rng: ChaCha8Rng,
}

impl RangeSimulator {
    pub fn new(params: RangeSimParams, camera: PinholeCamera, seed: u64) -> Self {
        Self {
            params,
            camera,
            next_reading: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Emit the reading due at or before `t`, if any.
    pub fn poll(&mut self, apple: &Apple, t: f64) -> Option<TimedInput> {
        if t < self.next_reading {
            return None;
        }
        let jitter = self.params.period_jitter * (2.0 * self.rng.gen::<f64>() - 1.0);
        self.next_reading += (1.0 + jitter) / self.params.rate_hz;

        if in_window(&self.params.dropouts, t) {
            return None;
        }
        // Distance along the viewing ray, as the projector expects.
        let p_cam = self.camera.from_reference(&Point3::from(apple.position));
        let distance = p_cam.coords.norm() + gaussian(&mut self.rng, self.params.noise_std);
        Some(TimedInput {
            arrival: t + self.params.latency,
            input: RawInput::Range { distance, stamp: t },
        })
    }
}
