//! Per-frame mapping of tracked landmarks onto mask vertices.
//!
//! Landmark `i` drives vertex `i` for the tracked part of the mesh. Vertices
//! past the tracked range are auxiliary geometry and are rigged to the tracked
//! ones according to the mesh's [`AuxiliaryPolicy`].
//!
//! Each landmark is checked against where its vertex would be had it moved
//! with the rest of the face since the last accepted frame (the rest pose
//! before the first one). Anything further off than `max_displacement` is
//! pulled back onto that bound.

use nalgebra::{Point3, Vector3};

use crate::config::{AuxiliaryPolicy, Config};
use crate::geometry::Mesh;
use crate::pose::{common_motion, AdaptedFrame};
use crate::LANDMARK_COUNT;

/// Result of one deformation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeformStats {
    /// Landmarks pulled back to the displacement bound
    pub clamped: usize,
}

#[derive(Debug, Clone)]
struct Attachment {
    vertex: usize,
    anchor: usize,
    offset: Vector3<f32>,
}

/// Owns the only write path into a mesh's vertex buffer
#[derive(Debug, Clone)]
pub struct Deformer {
    max_displacement: f32,
    tracked: usize,
    attachments: Vec<Attachment>,
    reference: Vec<Point3<f32>>,
}

impl Deformer {
    pub fn new(mesh: &Mesh, config: &Config) -> Self {
        let rest = mesh.rest_positions();
        let tracked = rest.len().min(LANDMARK_COUNT);

        let attachments = match config.mesh.auxiliary {
            AuxiliaryPolicy::Static => Vec::new(),
            AuxiliaryPolicy::RigidNearest => (tracked..rest.len())
                .map(|vertex| {
                    let anchor = nearest(&rest[..tracked], &rest[vertex]);
                    Attachment {
                        vertex,
                        anchor,
                        offset: rest[vertex] - rest[anchor],
                    }
                })
                .collect(),
        };
        if !attachments.is_empty() {
            log::info!("Rigged {} auxiliary vertices to nearest tracked vertex", attachments.len());
        }

        Self {
            max_displacement: config.deform.max_displacement,
            tracked,
            attachments,
            reference: rest[..tracked].to_vec(),
        }
    }

    /// Move the tracked vertices to the frame's landmarks.
    ///
    /// Only positions change; the triangle list is never touched.
    pub fn deform(&mut self, mesh: &mut Mesh, frame: &AdaptedFrame) -> DeformStats {
        let mut stats = DeformStats::default();
        let tracked = self.tracked.min(frame.model.len());
        let positions = mesh.positions_mut();

        let common = common_motion(&self.reference[..tracked], &frame.model[..tracked]);

        for (i, target) in frame.model.iter().take(tracked).enumerate() {
            let (p, clamped) = clamp_displacement(self.reference[i] + common, *target, self.max_displacement);
            if clamped {
                stats.clamped += 1;
            }
            positions[i] = p;
        }

        for a in &self.attachments {
            positions[a.vertex] = positions[a.anchor] + frame.rotation * a.offset;
        }

        self.reference.copy_from_slice(&positions[..self.tracked]);
        if stats.clamped > 0 {
            log::debug!("clamped {} landmark outliers", stats.clamped);
        }
        stats
    }
}

fn nearest(candidates: &[Point3<f32>], p: &Point3<f32>) -> usize {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, (c - p).norm_squared()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Limit `target` to lie within `bound` of `reference`
fn clamp_displacement(reference: Point3<f32>, target: Point3<f32>, bound: f32) -> (Point3<f32>, bool) {
    let delta = target - reference;
    let distance = delta.norm();
    if distance > bound {
        (reference + delta * (bound / distance), true)
    } else {
        (target, false)
    }
}
