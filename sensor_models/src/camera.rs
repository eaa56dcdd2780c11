//! Pinhole model of the palm camera.
//!
//! # Frames
//! Camera frame follows the computer-vision convention: X right, Y down,
//! Z forward along the optical axis. The extrinsic transform maps camera-frame
//! points into the fixed reference frame used by the tracker.
//!
//! # Back-projection
//! For pixel (u, v) and range ρ measured along the viewing ray:
//!
//! d = [(u − cx)/fx, (v − cy)/fy, 1]ᵀ,   p_cam = ρ · d / ‖d‖
//!
//! The Jacobian ∂p_cam/∂(u, v, ρ) is used for first-order covariance
//! propagation of pixel and range noise.

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Frame id of the camera's physical mounting.
pub const PALM_FRAME: &str = "palm";

/// Image resolution delivered by the camera driver (pixels).
pub const DEFAULT_RESOLUTION: (u32, u32) = (640, 360);

/// Active sensor area in meters. The sensor natively supports 672×380, so a
/// 640×360 image is a crop of the 5449 µm × 3072 µm die.
pub const DEFAULT_SENSOR_SIZE: (f64, f64) = (
    5449e-6 * (640.0 / 672.0),
    3072e-6 * (360.0 / 380.0),
);

/// Lens focal length (meters).
pub const DEFAULT_FOCAL_LENGTH: f64 = 11e-3;

/// Axis-aligned detection box in pixel coordinates (top-left corner + size).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PixelBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Box centered on pixel (u, v).
    pub fn centered(u: f64, v: f64, w: f64, h: f64) -> Self {
        Self::new(u - w / 2.0, v - h / 2.0, w, h)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Finite coordinates and strictly positive size.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite())
            && self.w > 0.0
            && self.h > 0.0
    }
}

// ---------------------------------------------------------------------------
// Calibration records
// ---------------------------------------------------------------------------

/// Camera intrinsics (distortion assumed pre-corrected).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length along x (pixels)
    pub fx: f64,
    /// Focal length along y (pixels)
    pub fy: f64,
    /// Principal point x (pixels)
    pub cx: f64,
    /// Principal point y (pixels)
    pub cy: f64,
    /// Image width (pixels)
    pub width: u32,
    /// Image height (pixels)
    pub height: u32,
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self::from_physical(DEFAULT_RESOLUTION, DEFAULT_SENSOR_SIZE, DEFAULT_FOCAL_LENGTH)
    }
}

impl Intrinsics {
    /// Derive pixel focal lengths from the physical sensor size and lens focal
    /// length. The principal point is placed at the image center.
    pub fn from_physical(resolution: (u32, u32), sensor_size: (f64, f64), focal_length: f64) -> Self {
        let (w, h) = (resolution.0 as f64, resolution.1 as f64);
        Self {
            fx: focal_length * w / sensor_size.0,
            fy: focal_length * h / sensor_size.1,
            cx: w / 2.0,
            cy: h / 2.0,
            width: resolution.0,
            height: resolution.1,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.fx > 0.0
            && self.fy > 0.0
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.width > 0
            && self.height > 0
    }

    /// Full field of view (horizontal, vertical) in radians.
    pub fn field_of_view(&self) -> (f64, f64) {
        (
            2.0 * (self.width as f64 / (2.0 * self.fx)).atan(),
            2.0 * (self.height as f64 / (2.0 * self.fy)).atan(),
        )
    }
}

/// Camera-to-reference transform: rotation as roll/pitch/yaw (radians),
/// applied before the translation (meters).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    pub translation: [f64; 3],
    pub rpy: [f64; 3],
}

impl Extrinsics {
    pub fn isometry(&self) -> Isometry3<f64> {
        let [x, y, z] = self.translation;
        let [roll, pitch, yaw] = self.rpy;
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.translation.iter().chain(self.rpy.iter()).all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Pinhole camera
// ---------------------------------------------------------------------------

/// Calibrated pinhole camera with a fixed pose in the reference frame.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    pub intrinsics: Intrinsics,
    /// Camera → reference transform
    pub camera_to_reference: Isometry3<f64>,
}

impl PinholeCamera {
    pub fn new(intrinsics: Intrinsics, extrinsics: &Extrinsics) -> Self {
        Self {
            intrinsics,
            camera_to_reference: extrinsics.isometry(),
        }
    }

    /// Unnormalized viewing ray through pixel (u, v), with unit z component.
    pub fn ray(&self, u: f64, v: f64) -> Vector3<f64> {
        let k = &self.intrinsics;
        Vector3::new((u - k.cx) / k.fx, (v - k.cy) / k.fy, 1.0)
    }

    /// Point at distance `range` along the ray through (u, v), camera frame.
    pub fn back_project(&self, u: f64, v: f64, range: f64) -> Point3<f64> {
        Point3::from(self.ray(u, v).normalize() * range)
    }

    /// Pixel coordinates of a camera-frame point, `None` behind the camera.
    pub fn project(&self, p_cam: &Point3<f64>) -> Option<(f64, f64)> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let k = &self.intrinsics;
        Some((
            k.fx * p_cam.x / p_cam.z + k.cx,
            k.fy * p_cam.y / p_cam.z + k.cy,
        ))
    }

    /// Jacobian of [`Self::back_project`] w.r.t. (u, v, range).
    /// Columns: ∂p/∂u, ∂p/∂v, ∂p/∂ρ.
    pub fn back_project_jacobian(&self, u: f64, v: f64, range: f64) -> Matrix3<f64> {
        let k = &self.intrinsics;
        let d = self.ray(u, v);
        let n = d.norm();
        let n2 = n * n;
        // ∂(d/‖d‖)/∂d_i = (e_i − d·d_i/‖d‖²)/‖d‖
        let du = (Vector3::x() - d * (d.x / n2)) * (range / (k.fx * n));
        let dv = (Vector3::y() - d * (d.y / n2)) * (range / (k.fy * n));
        let dr = d / n;
        Matrix3::from_columns(&[du, dv, dr])
    }

    /// Rotation part of the camera → reference transform.
    pub fn rotation(&self) -> Matrix3<f64> {
        self.camera_to_reference.rotation.to_rotation_matrix().into_inner()
    }

    pub fn to_reference(&self, p_cam: &Point3<f64>) -> Point3<f64> {
        self.camera_to_reference * p_cam
    }

    pub fn from_reference(&self, p_ref: &Point3<f64>) -> Point3<f64> {
        self.camera_to_reference.inverse_transform_point(p_ref)
    }

    /// Frustum corners on the plane z = `depth` (camera frame), clockwise from
    /// the top-left image corner.
    pub fn fov_frustum(&self, depth: f64) -> [Point3<f64>; 4] {
        let (w, h) = (self.intrinsics.width as f64, self.intrinsics.height as f64);
        self.box_outline(&PixelBox::new(0.0, 0.0, w, h), depth)
    }

    /// Corners of a pixel box back-projected onto the plane z = `depth`.
    pub fn box_outline(&self, pixel_box: &PixelBox, depth: f64) -> [Point3<f64>; 4] {
        let at = |u: f64, v: f64| Point3::from(self.ray(u, v) * depth);
        let (x0, y0) = (pixel_box.x, pixel_box.y);
        let (x1, y1) = (x0 + pixel_box.w, y0 + pixel_box.h);
        [at(x0, y0), at(x1, y0), at(x1, y1), at(x0, y1)]
    }
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::new(Intrinsics::default(), &Extrinsics::default())
    }
}
