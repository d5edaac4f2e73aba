//! Synthetic detector output for demos and tests.
//!
//! [`SwayingHead`] plays back the rest pose of a mask mesh as if a detector
//! were tracking a head that turns left and right while drifting across the
//! image. The landmarks are exactly what [`PoseAdapter`](crate::pose::PoseAdapter)
//! would map back onto the rotated rest pose.

use nalgebra::{Matrix4, Point3, Rotation3, Translation3, Vector3};
use std::f32::consts::TAU;

use crate::config::Config;
use crate::detect::{Detection, Detector};
use crate::geometry::Mesh;
use crate::pose::{PoseAdapter, PoseFrame};
use crate::{EXPRESSION_COUNT, LANDMARK_COUNT};

/// Procedural head that sways and drifts over time
#[derive(Debug, Clone)]
pub struct SwayingHead {
    rest: Vec<Point3<f32>>,
    width: f32,
    height: f32,
    mm_per_px: f32,
    base_depth: f32,
    /// Peak yaw in radians
    pub yaw_amplitude: f32,
    /// Peak horizontal drift of the face centre in pixels
    pub drift_px: f32,
    /// Duration of one full sway in milliseconds
    pub period_ms: f32,
}

impl SwayingHead {
    pub fn new(mesh: &Mesh, config: &Config) -> Self {
        let rest: Vec<_> = mesh.rest_positions().iter().take(LANDMARK_COUNT).copied().collect();
        // Centre the shell so the yaw turns it in place
        let centroid = rest.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / rest.len().max(1) as f32;
        let rest = rest.into_iter().map(|p| p - centroid).collect();

        Self {
            rest,
            width: config.render.width as f32,
            height: config.render.height as f32,
            mm_per_px: PoseAdapter::new(config).mm_per_px(),
            base_depth: config.camera.base_depth,
            yaw_amplitude: 0.35,
            drift_px: config.render.width as f32 * 0.2,
            period_ms: 4000.0,
        }
    }

    /// A motionless head facing the camera in the middle of the image
    pub fn still(mut self) -> Self {
        self.yaw_amplitude = 0.0;
        self.drift_px = 0.0;
        self
    }

    /// Detector output at time `t_ms`
    pub fn frame_at(&self, t_ms: u64) -> PoseFrame {
        let phase = TAU * t_ms as f32 / self.period_ms;
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw_amplitude * phase.sin());
        // Drift runs slower than the sway so the two do not stay in lockstep
        let center_x = self.width * 0.5 + self.drift_px * (phase * 0.6).sin();

        let landmarks = self
            .rest
            .iter()
            .map(|p| {
                let m = rotation * p;
                let px = center_x + m.x / self.mm_per_px;
                let py = self.height * 0.5 - m.y / self.mm_per_px;
                let pz = -m.z / self.mm_per_px;
                Point3::new(px / self.width, py / self.height, pz / self.width)
            })
            .collect();

        let offset_mm = (center_x - self.width * 0.5) * self.mm_per_px;
        let transform: Matrix4<f32> =
            Translation3::new(offset_mm, 0.0, -self.base_depth).to_homogeneous() * rotation.to_homogeneous();

        let openness = 0.5 + 0.5 * (phase * 2.0).sin();
        PoseFrame {
            landmarks,
            transform,
            expressions: vec![0.25 * openness; EXPRESSION_COUNT],
            timestamp_ms: t_ms,
        }
    }
}

impl Detector for SwayingHead {
    type Input = u64;

    fn detect(&mut self, t_ms: u64) -> Detection {
        Some(self.frame_at(t_ms))
    }
}
