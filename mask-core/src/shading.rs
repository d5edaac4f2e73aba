//! Lighting models for the mask surface.
//!
//! Everything here is a pure function of geometry, eye position and light
//! setup; re-shading the same inputs gives the same output.

use nalgebra::{Point3, Vector3};

use crate::camera::Camera;
use crate::config::{LightingConfig, WireframeConfig};

/// Upper bound of MatCap intensity; rim and fill may push past 1.0
const MATCAP_MAX: f32 = 1.5;

/// Surface lighting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    /// Texture or flat colour as is
    #[default]
    RawTexture,
    /// Ambient plus one diffuse light
    Lambert,
    /// Key and fill lights with a view-dependent rim
    MatCap,
    /// Anti-aliased triangle edges only
    Wireframe,
}

impl ShadingMode {
    pub const ALL: [ShadingMode; 4] = [
        ShadingMode::RawTexture,
        ShadingMode::Lambert,
        ShadingMode::MatCap,
        ShadingMode::Wireframe,
    ];

    /// Next mode in cycling order
    pub fn next(self) -> Self {
        match self {
            ShadingMode::RawTexture => ShadingMode::Lambert,
            ShadingMode::Lambert => ShadingMode::MatCap,
            ShadingMode::MatCap => ShadingMode::Wireframe,
            ShadingMode::Wireframe => ShadingMode::RawTexture,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShadingMode::RawTexture => "raw",
            ShadingMode::Lambert => "lambert",
            ShadingMode::MatCap => "matcap",
            ShadingMode::Wireframe => "wireframe",
        }
    }
}

/// Normalised light setup
#[derive(Debug, Clone, PartialEq)]
pub struct Lights {
    pub ambient: f32,
    pub diffuse: f32,
    pub key: Vector3<f32>,
    pub fill_direction: Vector3<f32>,
    pub fill: f32,
    pub rim: f32,
    pub rim_power: f32,
}

impl Lights {
    pub fn from_config(config: &LightingConfig) -> Self {
        let dir = |d: [f32; 3]| Vector3::from(d).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
        Self {
            ambient: config.ambient,
            diffuse: config.diffuse,
            key: dir(config.key_direction),
            fill_direction: dir(config.fill_direction),
            fill: config.fill,
            rim: config.rim,
            rim_power: config.rim_power,
        }
    }
}

impl Default for Lights {
    fn default() -> Self {
        Self::from_config(&LightingConfig::default())
    }
}

/// `ambient + diffuse * max(0, n_dot_l)`, never above `ambient + diffuse`
pub fn lambert(n_dot_l: f32, ambient: f32, diffuse: f32) -> f32 {
    (ambient + diffuse * n_dot_l.max(0.0)).min(ambient + diffuse)
}

/// Key + fill Lambert terms plus a Fresnel-like rim
pub fn matcap(normal: &Vector3<f32>, view: &Vector3<f32>, lights: &Lights) -> f32 {
    let key = lambert(normal.dot(&lights.key), lights.ambient, lights.diffuse);
    let fill = lights.fill * normal.dot(&lights.fill_direction).max(0.0);
    let facing = normal.dot(view).max(0.0);
    let rim = lights.rim * (1.0 - facing).powf(lights.rim_power);
    (key + fill + rim).clamp(0.0, MATCAP_MAX)
}

/// Per-vertex light factor that multiplies the surface colour
pub fn shade_vertices(
    mode: ShadingMode,
    positions: &[Point3<f32>],
    normals: &[Vector3<f32>],
    camera: &Camera,
    lights: &Lights,
) -> Vec<f32> {
    match mode {
        ShadingMode::RawTexture | ShadingMode::Wireframe => vec![1.0; positions.len()],
        ShadingMode::Lambert => normals
            .iter()
            .map(|n| lambert(n.dot(&lights.key), lights.ambient, lights.diffuse))
            .collect(),
        ShadingMode::MatCap => positions
            .iter()
            .zip(normals)
            .map(|(p, n)| matcap(n, &camera.view_direction(p), lights))
            .collect(),
    }
}

/// Wireframe line style in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireStyle {
    pub half_thickness: f32,
    pub falloff: f32,
    pub alpha: f32,
    pub color: [u8; 3],
}

impl WireStyle {
    pub fn from_config(config: &WireframeConfig) -> Self {
        Self {
            half_thickness: config.thickness * 0.5,
            falloff: config.falloff,
            alpha: config.alpha,
            color: config.color,
        }
    }

    /// Line opacity at `distance` pixels from the nearest edge
    pub fn coverage(&self, distance: f32) -> f32 {
        self.alpha * (1.0 - smoothstep(self.half_thickness, self.half_thickness + self.falloff, distance))
    }

    /// Distance beyond which an edge contributes nothing
    pub fn reach(&self) -> f32 {
        self.half_thickness + self.falloff
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(eye: Point3<f32>) -> Camera {
        Camera {
            position: eye,
            target: Point3::origin(),
            up: Vector3::y(),
            fov_y: 0.8,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }

    #[test]
    fn test_mode_cycle_visits_all() {
        let mut mode = ShadingMode::default();
        let mut seen = Vec::new();
        for _ in 0..ShadingMode::ALL.len() {
            seen.push(mode);
            mode = mode.next();
        }
        assert_eq!(mode, ShadingMode::RawTexture);
        assert_eq!(seen, ShadingMode::ALL.to_vec());
    }

    #[test]
    fn test_lambert_monotonic_and_bounded() {
        let (ambient, diffuse) = (0.2, 0.7);
        let mut last = f32::NEG_INFINITY;
        for i in -20..=20 {
            let d = i as f32 / 10.0;
            let value = lambert(d, ambient, diffuse);
            assert!(value >= last);
            assert!(value <= ambient + diffuse + 1e-6);
            last = value;
        }
        assert_eq!(lambert(-1.0, ambient, diffuse), ambient);
    }

    #[test]
    fn test_lambert_uses_fresh_normals() {
        let lights = Lights::default();
        let positions = [Point3::origin()];
        let camera = camera_at(Point3::new(0.0, 0.0, 10.0));
        let facing = shade_vertices(ShadingMode::Lambert, &positions, &[lights.key], &camera, &lights);
        let away = shade_vertices(ShadingMode::Lambert, &positions, &[-lights.key], &camera, &lights);
        assert!((facing[0] - (lights.ambient + lights.diffuse)).abs() < 1e-6);
        assert!((away[0] - lights.ambient).abs() < 1e-6);
    }

    #[test]
    fn test_matcap_rim_brightens_silhouette() {
        let lights = Lights {
            key: Vector3::y(),
            fill: 0.0,
            ..Lights::default()
        };
        let view = Vector3::z();
        // Both normals are perpendicular to the key light
        let front = matcap(&Vector3::z(), &view, &lights);
        let grazing = matcap(&Vector3::x(), &view, &lights);
        assert!(grazing > front);
        assert!((grazing - front - lights.rim).abs() < 1e-5);
    }

    #[test]
    fn test_raw_mode_is_unlit() {
        let lights = Lights::default();
        let out = shade_vertices(
            ShadingMode::RawTexture,
            &[Point3::origin(); 3],
            &[Vector3::x(); 3],
            &camera_at(Point3::new(0.0, 0.0, 1.0)),
            &lights,
        );
        assert_eq!(out, vec![1.0; 3]);
    }

    #[test]
    fn test_matcap_rim_follows_eye() {
        let lights = Lights {
            key: Vector3::y(),
            fill: 0.0,
            ..Lights::default()
        };
        let positions = [Point3::origin()];
        let normals = [Vector3::z()];
        let shade = |eye| shade_vertices(ShadingMode::MatCap, &positions, &normals, &camera_at(eye), &lights)[0];
        let head_on = shade(Point3::new(0.0, 0.0, 10.0));
        let side_on = shade(Point3::new(10.0, 0.0, 0.0));
        assert!((side_on - head_on - lights.rim).abs() < 1e-5);
    }

    #[test]
    fn test_wire_coverage_falloff() {
        let style = WireStyle {
            half_thickness: 0.5,
            falloff: 1.0,
            alpha: 0.8,
            color: [255; 3],
        };
        assert!((style.coverage(0.0) - 0.8).abs() < 1e-6);
        assert!((style.coverage(0.5) - 0.8).abs() < 1e-6);
        assert!(style.coverage(1.0) < 0.8 && style.coverage(1.0) > 0.0);
        assert_eq!(style.coverage(1.5), 0.0);
        assert_eq!(style.reach(), 1.5);
    }
}
