//! Configuration management for the mask renderer

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render target configuration
    pub render: RenderConfig,

    /// Mesh asset configuration
    pub mesh: MeshConfig,

    /// Virtual camera configuration
    pub camera: CameraConfig,

    /// Deformation limits
    pub deform: DeformConfig,

    /// Light setup for Lambert and MatCap shading
    pub lighting: LightingConfig,

    /// Wireframe line style
    pub wireframe: WireframeConfig,

    /// Export and recording destinations
    pub output: OutputConfig,
}

/// Render target parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Render target width in pixels
    pub width: u32,

    /// Render target height in pixels
    pub height: u32,

    /// Target framerate
    pub target_fps: u32,

    /// Colour used when no background frame is shown
    pub clear_color: [u8; 3],

    /// Mirror landmarks horizontally (selfie view)
    pub mirror: bool,
}

/// How vertices beyond the tracked 468 follow the head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryPolicy {
    /// Keep the rest offset to the nearest tracked vertex, rotated with the head
    RigidNearest,
    /// Leave auxiliary vertices at their rest position
    Static,
}

/// Mesh asset parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Path to the OBJ asset
    pub path: PathBuf,

    /// Texture to use instead of the material's `map_Kd`
    pub texture: Option<PathBuf>,

    /// Rigging of auxiliary vertices
    pub auxiliary: AuxiliaryPolicy,

    /// Use the built-in face shell if the asset cannot be loaded
    pub fallback_to_builtin: bool,
}

/// Camera follow and perspective parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Smoothing factor alpha, (0, 1); lower is smoother
    pub smoothing: f32,

    /// World offset (mm) for a face at the screen edge
    pub sensitivity: f32,

    /// Largest allowed offset magnitude (mm)
    pub max_offset: f32,

    /// Lens focal length (mm)
    pub focal_length_mm: f32,

    /// Assumed sensor width (mm)
    pub sensor_width_mm: f32,

    /// Camera distance to the mask for a face of reference size (mm)
    pub base_depth: f32,

    /// Depth swing applied by the dolly curve (mm)
    pub depth_variation: f32,

    /// Face width as a fraction of screen width at `base_depth`
    pub reference_spread: f32,

    /// Near clip plane (mm)
    pub near: f32,

    /// Far clip plane (mm)
    pub far: f32,
}

/// Deformation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformConfig {
    /// Largest per-frame landmark displacement accepted (mm)
    pub max_displacement: f32,
}

/// Light directions point from the surface towards the light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: f32,
    pub diffuse: f32,
    pub key_direction: [f32; 3],
    pub fill_direction: [f32; 3],
    /// Fill light strength (MatCap)
    pub fill: f32,
    /// Rim strength (MatCap)
    pub rim: f32,
    /// Rim falloff exponent (MatCap)
    pub rim_power: f32,
}

/// Wireframe line parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireframeConfig {
    /// Line thickness in pixels
    pub thickness: f32,

    /// Peak line opacity
    pub alpha: f32,

    /// Width of the anti-aliasing ramp in pixels
    pub falloff: f32,

    /// Line colour
    pub color: [u8; 3],
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for OBJ snapshots
    pub export_dir: PathBuf,

    /// Session log file
    pub session_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            mesh: MeshConfig::default(),
            camera: CameraConfig::default(),
            deform: DeformConfig::default(),
            lighting: LightingConfig::default(),
            wireframe: WireframeConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            target_fps: 30,
            clear_color: [16, 16, 20],
            mirror: false,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/facemesh.obj"),
            texture: None,
            auxiliary: AuxiliaryPolicy::RigidNearest,
            fallback_to_builtin: true,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.3,
            sensitivity: 180.0,
            max_offset: 250.0,
            focal_length_mm: 50.0,
            sensor_width_mm: 36.0,
            base_depth: 500.0,
            depth_variation: 100.0,
            reference_spread: 0.35,
            near: 10.0,
            far: 5000.0,
        }
    }
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            max_displacement: 40.0,
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: 0.25,
            diffuse: 0.75,
            key_direction: [0.4, 0.6, 0.7],
            fill_direction: [0.0, 0.0, 1.0],
            fill: 0.3,
            rim: 0.35,
            rim_power: 3.0,
        }
    }
}

impl Default for WireframeConfig {
    fn default() -> Self {
        Self {
            thickness: 1.2,
            alpha: 0.85,
            falloff: 1.0,
            color: [90, 230, 255],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("exported_models"),
            session_log: PathBuf::from("session.yaml"),
        }
    }
}

fn check_range(name: &str, value: f32, lo: f32, hi: f32, lo_open: bool) -> Result<()> {
    let above_lo = if lo_open { value > lo } else { value >= lo };
    if value.is_finite() && above_lo && value <= hi {
        return Ok(());
    }
    let open = if lo_open { '(' } else { '[' };
    Err(Error::ConfigError(format!(
        "{name} = {value} is out of range, expected {open}{lo}, {hi}]"
    )))
}

/// Open interval check, `lo < value < hi`
fn check_open(name: &str, value: f32, lo: f32, hi: f32) -> Result<()> {
    if value.is_finite() && value > lo && value < hi {
        return Ok(());
    }
    Err(Error::ConfigError(format!(
        "{name} = {value} is out of range, expected ({lo}, {hi})"
    )))
}

fn check_positive(name: &str, value: f32) -> Result<()> {
    check_range(name, value, 0.0, f32::MAX, true)
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(Error::ConfigError(format!(
                "render size {}x{} is invalid, both sides must be at least 1",
                self.render.width, self.render.height
            )));
        }
        if self.render.target_fps == 0 {
            return Err(Error::ConfigError("Target FPS must be greater than 0".to_string()));
        }

        let cam = &self.camera;
        check_open("camera.smoothing", cam.smoothing, 0.0, 1.0)?;
        check_range("camera.sensitivity", cam.sensitivity, 0.0, f32::MAX, false)?;
        check_range("camera.max_offset", cam.max_offset, 0.0, f32::MAX, false)?;
        check_positive("camera.focal_length_mm", cam.focal_length_mm)?;
        check_positive("camera.sensor_width_mm", cam.sensor_width_mm)?;
        check_positive("camera.base_depth", cam.base_depth)?;
        check_range("camera.depth_variation", cam.depth_variation, 0.0, cam.base_depth * 0.9, false)?;
        check_range("camera.reference_spread", cam.reference_spread, 0.0, 1.0, true)?;
        check_positive("camera.near", cam.near)?;
        if cam.far <= cam.near {
            return Err(Error::ConfigError(format!(
                "camera.far = {} must be greater than camera.near = {}",
                cam.far, cam.near
            )));
        }

        check_positive("deform.max_displacement", self.deform.max_displacement)?;

        let light = &self.lighting;
        check_range("lighting.ambient", light.ambient, 0.0, 1.0, false)?;
        check_range("lighting.diffuse", light.diffuse, 0.0, 1.0, false)?;
        check_range("lighting.fill", light.fill, 0.0, 1.0, false)?;
        check_range("lighting.rim", light.rim, 0.0, 1.0, false)?;
        check_positive("lighting.rim_power", light.rim_power)?;
        for (name, dir) in [
            ("lighting.key_direction", light.key_direction),
            ("lighting.fill_direction", light.fill_direction),
        ] {
            let len = dir.iter().map(|c| c * c).sum::<f32>().sqrt();
            if !len.is_finite() || len < 1e-6 {
                return Err(Error::ConfigError(format!("{name} must be a non-zero vector")));
            }
        }

        check_positive("wireframe.thickness", self.wireframe.thickness)?;
        check_range("wireframe.alpha", self.wireframe.alpha, 0.0, 1.0, true)?;
        check_positive("wireframe.falloff", self.wireframe.falloff)?;

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face mask renderer configuration

render:
  width: 1280
  height: 720
  target_fps: 30
  clear_color: [16, 16, 20]
  mirror: false

mesh:
  path: "assets/facemesh.obj"
  # texture: "assets/facemesh.png"
  auxiliary: rigid_nearest   # or: static
  fallback_to_builtin: true

# Camera follow: offset = clamp(sensitivity * normalized_center, max_offset)
camera:
  smoothing: 0.3
  sensitivity: 180.0
  max_offset: 250.0
  focal_length_mm: 50.0
  sensor_width_mm: 36.0
  base_depth: 500.0
  depth_variation: 100.0
  reference_spread: 0.35
  near: 10.0
  far: 5000.0

deform:
  max_displacement: 40.0

lighting:
  ambient: 0.25
  diffuse: 0.75
  key_direction: [0.4, 0.6, 0.7]
  fill_direction: [0.0, 0.0, 1.0]
  fill: 0.3
  rim: 0.35
  rim_power: 3.0

wireframe:
  thickness: 1.2
  alpha: 0.85
  falloff: 1.0
  color: [90, 230, 255]

output:
  export_dir: "exported_models"
  session_log: "session.yaml"
"#;
