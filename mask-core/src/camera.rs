/// Smoothed follow camera and pinhole projection
use nalgebra::{Matrix4, Point3, Vector3};

use crate::config::Config;
use crate::pose::AdaptedFrame;

/// Pixel-space pinhole parameters of the render camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

/// Camera configuration for one rendered frame
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov_y, self.near, self.far)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Direction from `point` towards the eye
    pub fn view_direction(&self, point: &Point3<f32>) -> Vector3<f32> {
        (self.position - point).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z)
    }
}

/// Smoothed camera parameters carried from frame to frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Horizontal view offset (mm); positive moves the mask right on screen
    pub current_offset: f32,
    pub target_offset: f32,
    /// Eye distance to the model origin (mm)
    pub depth: f32,
    pub target_depth: f32,
    pub focal_length_mm: f32,
    pub sensor_width_mm: f32,
    pub base_depth: f32,
    pub depth_variation: f32,
    pub aspect: f32,
}

impl CameraState {
    /// Vertical field of view of the focal length on the assumed sensor
    pub fn fov_y(&self) -> f32 {
        let sensor_height = self.sensor_width_mm / self.aspect;
        2.0 * (sensor_height / (2.0 * self.focal_length_mm)).atan()
    }
}

/// Dolly curve: maps face width (fraction of screen) to a factor in (-1, 1).
///
/// Monotonically decreasing, zero at `reference`; a face smaller than the
/// reference pushes the camera back.
pub fn depth_curve(spread: f32, reference: f32) -> f32 {
    ((reference - spread) / reference).tanh()
}

/// One step of the first-order low-pass filter
pub fn smooth_toward(current: f32, target: f32, alpha: f32) -> f32 {
    current + alpha * (target - current)
}

/// Tracks the face horizontally with an exponentially smoothed offset
#[derive(Debug, Clone)]
pub struct CameraController {
    state: CameraState,
    follow: bool,
    smoothing: f32,
    sensitivity: f32,
    max_offset: f32,
    reference_spread: f32,
    near: f32,
    far: f32,
    width: f32,
    height: f32,
}

impl CameraController {
    pub fn new(config: &Config) -> Self {
        let cam = &config.camera;
        let width = config.render.width as f32;
        let height = config.render.height as f32;
        Self {
            state: CameraState {
                current_offset: 0.0,
                target_offset: 0.0,
                depth: cam.base_depth,
                target_depth: cam.base_depth,
                focal_length_mm: cam.focal_length_mm,
                sensor_width_mm: cam.sensor_width_mm,
                base_depth: cam.base_depth,
                depth_variation: cam.depth_variation,
                aspect: width / height,
            },
            follow: true,
            smoothing: cam.smoothing,
            sensitivity: cam.sensitivity,
            max_offset: cam.max_offset,
            reference_spread: cam.reference_spread,
            near: cam.near,
            far: cam.far,
            width,
            height,
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    /// Enable or freeze camera follow; no state is reset either way
    pub fn set_follow(&mut self, follow: bool) {
        if follow != self.follow {
            log::debug!("camera follow {}", if follow { "on" } else { "off" });
        }
        self.follow = follow;
    }

    /// Offset the camera should head for given a face centre in pixels
    pub fn target_offset_for(&self, face_center_x: f32) -> f32 {
        let half_width = self.width * 0.5;
        let normalized = (face_center_x - half_width) / half_width;
        (normalized * self.sensitivity).clamp(-self.max_offset, self.max_offset)
    }

    /// Advance the camera by one frame
    pub fn update(&mut self, frame: &AdaptedFrame) {
        self.state.target_offset = self.target_offset_for(frame.bounds.center_x());
        let spread = frame.bounds.width() / self.width;
        self.state.target_depth =
            self.state.base_depth + self.state.depth_variation * depth_curve(spread, self.reference_spread);

        if !self.follow {
            return;
        }
        self.state.current_offset = smooth_toward(self.state.current_offset, self.state.target_offset, self.smoothing);
        self.state.depth = smooth_toward(self.state.depth, self.state.target_depth, self.smoothing);
    }

    /// Render camera for the current state
    pub fn camera(&self) -> Camera {
        let x = -self.state.current_offset;
        Camera {
            position: Point3::new(x, 0.0, self.state.depth),
            target: Point3::new(x, 0.0, 0.0),
            up: Vector3::y(),
            fov_y: self.state.fov_y(),
            aspect: self.state.aspect,
            near: self.near,
            far: self.far,
        }
    }

    pub fn intrinsics(&self) -> Intrinsics {
        let fx = self.state.focal_length_mm / self.state.sensor_width_mm * self.width;
        Intrinsics {
            fx,
            fy: fx,
            cx: self.width * 0.5,
            cy: self.height * 0.5,
        }
    }
}
