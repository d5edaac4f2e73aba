/// Geometry primitives for the deformable mask mesh
use nalgebra::{Point3, Vector2, Vector3};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{Error, Result, LANDMARK_COUNT};

/// A triangle as three indices into the vertex buffer
pub type Face = [u32; 3];

/// Connectivity and surface attributes of a mesh.
///
/// Built once at load time and shared read-only afterwards; nothing in the
/// frame loop holds a mutable reference to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub triangles: Vec<Face>,
    /// Per-vertex texture coordinates, `v` pointing up as in OBJ
    pub uvs: Option<Vec<Vector2<f32>>>,
    /// Texture bound by the asset's material, if any
    pub texture: Option<PathBuf>,
}

/// A mask mesh: shared topology plus a mutable vertex buffer
#[derive(Debug, Clone)]
pub struct Mesh {
    topology: Arc<Topology>,
    rest: Arc<Vec<Point3<f32>>>,
    positions: Vec<Point3<f32>>,
}

impl Mesh {
    /// Build a mesh, checking every index against the vertex buffer
    pub fn new(positions: Vec<Point3<f32>>, topology: Topology) -> Result<Self> {
        let vertex_count = positions.len();
        if let Some((i, face)) = topology
            .triangles
            .iter()
            .enumerate()
            .find(|(_, f)| f.iter().any(|&idx| idx as usize >= vertex_count))
        {
            return Err(Error::asset(
                PathBuf::new(),
                format!("triangle {i} {face:?} references a vertex outside 0..{vertex_count}"),
            ));
        }
        if let Some(uvs) = &topology.uvs {
            if uvs.len() != vertex_count {
                return Err(Error::asset(
                    PathBuf::new(),
                    format!("{} UVs for {} vertices", uvs.len(), vertex_count),
                ));
            }
        }

        Ok(Self {
            topology: Arc::new(topology),
            rest: Arc::new(positions.clone()),
            positions,
        })
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn triangles(&self) -> &[Face] {
        &self.topology.triangles
    }

    pub fn uvs(&self) -> Option<&[Vector2<f32>]> {
        self.topology.uvs.as_deref()
    }

    pub fn positions(&self) -> &[Point3<f32>] {
        &self.positions
    }

    pub(crate) fn positions_mut(&mut self) -> &mut [Point3<f32>] {
        &mut self.positions
    }

    /// Vertex positions as loaded, before any deformation
    pub fn rest_positions(&self) -> &[Point3<f32>] {
        &self.rest
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Area-weighted vertex normals of the current (deformed) positions.
    ///
    /// Must be called after every deformation; normals are never cached.
    pub fn vertex_normals(&self) -> Vec<Vector3<f32>> {
        let mut normals = vec![Vector3::zeros(); self.positions.len()];
        for face in &self.topology.triangles {
            let [a, b, c] = face.map(|i| i as usize);
            let n = (self.positions[b] - self.positions[a]).cross(&(self.positions[c] - self.positions[a]));
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in &mut normals {
            *n = n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
        }
        normals
    }

    /// Built-in face shell used when no asset can be loaded.
    ///
    /// A 26×18 grid over the front of an ellipsoid (468 vertices, same count
    /// as the detector topology), facing +Z, sized in millimetres.
    pub fn builtin_face() -> Self {
        const COLS: usize = 26;
        const ROWS: usize = 18;
        const HALF_WIDTH: f32 = 70.0;
        const HALF_HEIGHT: f32 = 95.0;
        const DEPTH: f32 = 60.0;
        debug_assert_eq!(COLS * ROWS, LANDMARK_COUNT);

        let span = std::f32::consts::PI * 0.45;
        let mut positions = Vec::with_capacity(COLS * ROWS);
        let mut uvs = Vec::with_capacity(COLS * ROWS);
        for r in 0..ROWS {
            let v = r as f32 / (ROWS - 1) as f32;
            let phi = (v - 0.5) * 2.0 * span;
            for c in 0..COLS {
                let u = c as f32 / (COLS - 1) as f32;
                let theta = (u - 0.5) * 2.0 * span;
                positions.push(Point3::new(
                    HALF_WIDTH * theta.sin() * phi.cos(),
                    -HALF_HEIGHT * phi.sin(),
                    DEPTH * theta.cos() * phi.cos(),
                ));
                uvs.push(Vector2::new(u, 1.0 - v));
            }
        }

        let mut triangles = Vec::with_capacity((COLS - 1) * (ROWS - 1) * 2);
        for r in 0..ROWS - 1 {
            for c in 0..COLS - 1 {
                let i00 = (r * COLS + c) as u32;
                let i01 = i00 + 1;
                let i10 = i00 + COLS as u32;
                let i11 = i10 + 1;
                // Counter-clockwise seen from +Z
                triangles.push([i00, i10, i11]);
                triangles.push([i00, i11, i01]);
            }
        }

        let topology = Topology {
            triangles,
            uvs: Some(uvs),
            texture: None,
        };
        Self {
            topology: Arc::new(topology),
            rest: Arc::new(positions.clone()),
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let topology = Topology {
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            uvs: None,
            texture: None,
        };
        Mesh::new(positions, topology).unwrap()
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let topology = Topology {
            triangles: vec![[0, 1, 3]],
            uvs: None,
            texture: None,
        };
        let positions = vec![Point3::origin(); 3];
        assert!(matches!(
            Mesh::new(positions, topology),
            Err(Error::AssetLoadError { .. })
        ));
    }

    #[test]
    fn test_vertex_normals_follow_deformation() {
        let mut mesh = quad();
        let before = mesh.vertex_normals();
        assert!((before[0] - Vector3::z()).norm() < 1e-6);

        // Tilt the quad about the X axis
        for p in mesh.positions_mut() {
            p.z = p.y;
        }
        let after = mesh.vertex_normals();
        let expected = Vector3::new(0.0, -1.0, 1.0).normalize();
        assert!((after[0] - expected).norm() < 1e-5);
    }

    #[test]
    fn test_builtin_face_shape() {
        let mesh = Mesh::builtin_face();
        assert_eq!(mesh.vertex_count(), LANDMARK_COUNT);
        assert_eq!(mesh.triangles().len(), 25 * 17 * 2);
        assert_eq!(mesh.uvs().map(|u| u.len()), Some(LANDMARK_COUNT));

        // The middle of the shell faces the camera
        let normals = mesh.vertex_normals();
        let centre = 8 * 26 + 12;
        assert!(normals[centre].z > 0.9);
    }
}
