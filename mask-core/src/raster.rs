/// Depth-buffered triangle rasterizer for the mask mesh
use image::{Rgb, RgbImage};
use nalgebra::{Matrix4, Point3, Vector2, Vector3};

use crate::camera::Camera;
use crate::geometry::{Face, Mesh};
use crate::shading::{ShadingMode, WireStyle};
use crate::texture::Texture;

/// Slack when an edge is depth-tested against its own surface
const EDGE_DEPTH_BIAS: f32 = 1e-5;

/// Colour source for filled shading modes
#[derive(Debug, Clone, Copy)]
pub struct Surface<'a> {
    /// Flat colour in [0, 1]
    pub flat: Vector3<f32>,
    /// Texture and UVs; both must be present for texturing
    pub texture: Option<(&'a Texture, &'a [Vector2<f32>])>,
}

impl<'a> Surface<'a> {
    pub fn flat(color: [u8; 3]) -> Self {
        Self {
            flat: Vector3::new(color[0] as f32, color[1] as f32, color[2] as f32) / 255.0,
            texture: None,
        }
    }
}

/// Counters for one rasterization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterStats {
    pub drawn: usize,
    pub culled: usize,
    pub clipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    inv_w: f32,
}

/// Rasterizer owning the depth buffer for one render target size
pub struct Rasterizer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
}

impl Rasterizer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; width * height],
        }
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(f32::INFINITY);
    }

    /// Depth of the nearest surface at a pixel, if anything was drawn there
    pub fn depth_at(&self, x: usize, y: usize) -> Option<f32> {
        let d = *self.depth_buffer.get(y * self.width + x)?;
        d.is_finite().then_some(d)
    }

    /// Project, rasterize and shade the mesh into `target`.
    ///
    /// `shades` holds one light factor per vertex. Back faces are culled in
    /// every mode, so the wireframe only outlines the visible side of the mask.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_mesh(
        &mut self,
        target: &mut RgbImage,
        mesh: &Mesh,
        camera: &Camera,
        shades: &[f32],
        surface: &Surface,
        mode: ShadingMode,
        wire: &WireStyle,
    ) -> RasterStats {
        debug_assert_eq!(target.width() as usize, self.width);
        debug_assert_eq!(target.height() as usize, self.height);

        let projected = self.project(mesh.positions(), &camera.view_projection());
        let mut stats = RasterStats::default();

        let mut front_faces: Vec<(&Face, [ScreenVertex; 3])> = Vec::with_capacity(mesh.triangles().len());
        for face in mesh.triangles() {
            let [a, b, c] = face.map(|i| projected[i as usize]);
            let (Some(a), Some(b), Some(c)) = (a, b, c) else {
                stats.clipped += 1;
                continue;
            };
            // Counter-clockwise in the world is clockwise once y points down
            if signed_area(&a, &b, &c) >= 0.0 {
                stats.culled += 1;
                continue;
            }
            front_faces.push((face, [a, b, c]));
        }

        match mode {
            ShadingMode::Wireframe => {
                for (_, verts) in &front_faces {
                    self.fill_depth(verts);
                }
                for (_, verts) in &front_faces {
                    self.draw_edges(target, verts, wire);
                }
            }
            ShadingMode::RawTexture | ShadingMode::Lambert | ShadingMode::MatCap => {
                for (face, verts) in &front_faces {
                    self.fill_triangle(target, face, verts, shades, surface);
                }
            }
        }
        stats.drawn = front_faces.len();
        stats
    }

    fn project(&self, positions: &[Point3<f32>], view_projection: &Matrix4<f32>) -> Vec<Option<ScreenVertex>> {
        positions
            .iter()
            .map(|p| {
                let clip = view_projection * p.to_homogeneous();
                // Prevent division by near-zero or negative w (behind the eye)
                if clip.w < 1e-6 {
                    return None;
                }
                let inv_w = 1.0 / clip.w;
                let ndc = clip.xyz() * inv_w;
                if ndc.z < -1.0 || ndc.z > 1.0 {
                    return None;
                }
                Some(ScreenVertex {
                    x: (ndc.x + 1.0) * 0.5 * self.width as f32,
                    y: (1.0 - ndc.y) * 0.5 * self.height as f32,
                    depth: ndc.z,
                    inv_w,
                })
            })
            .collect()
    }

    fn bounds(&self, v: &[ScreenVertex; 3]) -> Option<(usize, usize, usize, usize)> {
        let min_x = v[0].x.min(v[1].x).min(v[2].x).floor().max(0.0);
        let max_x = v[0].x.max(v[1].x).max(v[2].x).ceil().min(self.width as f32 - 1.0);
        let min_y = v[0].y.min(v[1].y).min(v[2].y).floor().max(0.0);
        let max_y = v[0].y.max(v[1].y).max(v[2].y).ceil().min(self.height as f32 - 1.0);
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some((min_x as usize, max_x as usize, min_y as usize, max_y as usize))
    }

    fn fill_triangle(
        &mut self,
        target: &mut RgbImage,
        face: &Face,
        v: &[ScreenVertex; 3],
        shades: &[f32],
        surface: &Surface,
    ) {
        let Some((min_x, max_x, min_y, max_y)) = self.bounds(v) else {
            return;
        };
        let [i0, i1, i2] = face.map(|i| i as usize);
        let shade = [shades[i0], shades[i1], shades[i2]];

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((v[0].x, v[0].y), (v[1].x, v[1].y), (v[2].x, v[2].y), p) else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                let idx = y * self.width + x;
                if depth >= self.depth_buffer[idx] {
                    continue;
                }
                self.depth_buffer[idx] = depth;

                // Perspective-correct weights for attributes
                let (p0, p1, p2) = (w0 * v[0].inv_w, w1 * v[1].inv_w, w2 * v[2].inv_w);
                let sum = p0 + p1 + p2;
                let (p0, p1, p2) = (p0 / sum, p1 / sum, p2 / sum);

                let light = p0 * shade[0] + p1 * shade[1] + p2 * shade[2];
                let base = match surface.texture {
                    Some((texture, uvs)) => texture.sample(uvs[i0] * p0 + uvs[i1] * p1 + uvs[i2] * p2),
                    None => surface.flat,
                };
                target.put_pixel(x as u32, y as u32, to_rgb(base * light));
            }
        }
    }

    fn fill_depth(&mut self, v: &[ScreenVertex; 3]) {
        let Some((min_x, max_x, min_y, max_y)) = self.bounds(v) else {
            return;
        };
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                if let Some((w0, w1, w2)) = barycentric((v[0].x, v[0].y), (v[1].x, v[1].y), (v[2].x, v[2].y), p) {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                        let idx = y * self.width + x;
                        if depth < self.depth_buffer[idx] {
                            self.depth_buffer[idx] = depth;
                        }
                    }
                }
            }
        }
    }

    /// Blend the triangle's edges using distance-to-edge coverage
    fn draw_edges(&mut self, target: &mut RgbImage, v: &[ScreenVertex; 3], wire: &WireStyle) {
        let Some((min_x, max_x, min_y, max_y)) = self.bounds(v) else {
            return;
        };
        let area2 = signed_area(&v[0], &v[1], &v[2]).abs();
        // Height of each vertex over its opposite edge
        let heights = [
            area2 / edge_length(&v[1], &v[2]),
            area2 / edge_length(&v[2], &v[0]),
            area2 / edge_length(&v[0], &v[1]),
        ];
        let color = Vector3::new(wire.color[0] as f32, wire.color[1] as f32, wire.color[2] as f32) / 255.0;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((v[0].x, v[0].y), (v[1].x, v[1].y), (v[2].x, v[2].y), p) else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let distance = (w0 * heights[0]).min(w1 * heights[1]).min(w2 * heights[2]);
                if distance >= wire.reach() {
                    continue;
                }

                let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                let idx = y * self.width + x;
                if depth > self.depth_buffer[idx] + EDGE_DEPTH_BIAS {
                    continue;
                }

                let alpha = wire.coverage(distance);
                let Rgb([r, g, b]) = *target.get_pixel(x as u32, y as u32);
                let dst = Vector3::new(r as f32, g as f32, b as f32) / 255.0;
                target.put_pixel(x as u32, y as u32, to_rgb(dst.lerp(&color, alpha)));
            }
        }
    }
}

fn to_rgb(c: Vector3<f32>) -> Rgb<u8> {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    Rgb([q(c.x), q(c.y), q(c.z)])
}

fn signed_area(a: &ScreenVertex, b: &ScreenVertex, c: &ScreenVertex) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

fn edge_length(a: &ScreenVertex, b: &ScreenVertex) -> f32 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt().max(f32::EPSILON)
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(v0: (f32, f32), v1: (f32, f32), v2: (f32, f32), p: (f32, f32)) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}
