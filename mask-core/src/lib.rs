/// Face Mask Core Library - Real-time face mask deformation and rendering
///
/// This library turns per-frame landmark and head-pose data from a face
/// detector into a rendered 3D mask: it deforms a fixed-topology mesh, follows
/// the face with a smoothed camera, shades and rasterizes the result over an
/// optional background. It has no terminal or window code of its own.

pub mod camera;
pub mod composite;
pub mod config;
pub mod deform;
pub mod detect;
pub mod error;
pub mod export;
pub mod geometry;
pub mod mode;
pub mod obj;
pub mod pipeline;
pub mod pose;
pub mod raster;
pub mod recorder;
pub mod shading;
pub mod synthetic;
pub mod texture;

/// Landmarks per detector frame; also the tracked vertex count of a mask mesh
pub const LANDMARK_COUNT: usize = 468;
/// Blend-shape weights per detector frame, when the detector provides them
pub const EXPRESSION_COUNT: usize = 52;

// Re-export commonly used types
pub use camera::{Camera, CameraController, CameraState};
pub use config::Config;
pub use error::{Error, Result};
pub use geometry::{Face, Mesh, Topology};
pub use mode::{Command, RenderSettings};
pub use pipeline::{FrameStats, MaskSession};
pub use pose::{AdaptedFrame, PoseAdapter, PoseFrame};
pub use shading::ShadingMode;
