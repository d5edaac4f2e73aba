//! The per-frame pipeline.
//!
//! [`MaskSession`] owns every stage and runs them in order for each detector
//! frame: pose adapter, deformer, camera controller, shading, rasterizer and
//! compositor. Export and recording go through the same `&mut self`, so they
//! only ever see a completed frame.

use image::RgbImage;
use nalgebra::Matrix4;
use std::path::PathBuf;

use crate::camera::{CameraController, CameraState};
use crate::composite::Compositor;
use crate::config::Config;
use crate::deform::Deformer;
use crate::export::export_obj;
use crate::geometry::Mesh;
use crate::mode::{Command, RenderSettings};
use crate::obj::load_mesh;
use crate::pose::{AdaptedFrame, PoseAdapter, PoseFrame};
use crate::raster::{RasterStats, Rasterizer, Surface};
use crate::recorder::{SessionRecord, SessionRecorder};
use crate::shading::{shade_vertices, Lights, WireStyle};
use crate::texture::Texture;
use crate::Result;

/// Running counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that produced a mask render
    pub rendered: u64,
    /// Frames rejected by validation
    pub skipped: u64,
    /// Ticks without a detected face
    pub no_face: u64,
    /// Landmarks pulled back by the outlier clamp, summed over the session
    pub clamped: u64,
    /// Detector frames overwritten before the renderer took them
    pub dropped: u64,
    pub last_raster: RasterStats,
}

/// A running mask renderer
pub struct MaskSession {
    config: Config,
    mesh: Mesh,
    texture: Option<Texture>,
    adapter: PoseAdapter,
    deformer: Deformer,
    camera: CameraController,
    rasterizer: Rasterizer,
    compositor: Compositor,
    lights: Lights,
    wire: WireStyle,
    settings: RenderSettings,
    target: RgbImage,
    stats: FrameStats,
    last_frame: Option<AdaptedFrame>,
    last_transform: Option<Matrix4<f32>>,
    last_export: Option<PathBuf>,
    recorder: Option<SessionRecorder>,
}

impl MaskSession {
    /// Validate `config`, load the mesh asset and its texture.
    ///
    /// A missing or broken mesh falls back to the built-in face shell when
    /// `mesh.fallback_to_builtin` is set. A texture that fails to load only
    /// disables texturing.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mesh = match load_mesh(&config.mesh.path) {
            Ok(mesh) => mesh,
            Err(e) if config.mesh.fallback_to_builtin => {
                log::warn!("{}; using the built-in face shell", e);
                Mesh::builtin_face()
            }
            Err(e) => return Err(e),
        };

        let texture_path = config.mesh.texture.clone().or_else(|| mesh.topology().texture.clone());
        let texture = texture_path.and_then(|path| match Texture::load(&path) {
            Ok(texture) => Some(texture),
            Err(e) => {
                log::warn!("{}; rendering with flat colour", e);
                None
            }
        });

        Self::with_mesh(config, mesh, texture)
    }

    /// Build a session around an already loaded mesh
    pub fn with_mesh(config: Config, mesh: Mesh, texture: Option<Texture>) -> Result<Self> {
        config.validate()?;
        if texture.is_some() && mesh.uvs().is_none() {
            log::warn!("Mesh has no UVs; texture will not be used");
        }

        let (width, height) = (config.render.width, config.render.height);
        log::info!(
            "Mask session {}x{} @ {} fps, {} vertices, {} triangles",
            width,
            height,
            config.render.target_fps,
            mesh.vertex_count(),
            mesh.triangles().len()
        );

        Ok(Self {
            adapter: PoseAdapter::new(&config),
            deformer: Deformer::new(&mesh, &config),
            camera: CameraController::new(&config),
            rasterizer: Rasterizer::new(width as usize, height as usize),
            compositor: Compositor::new(config.render.clear_color),
            lights: Lights::from_config(&config.lighting),
            wire: WireStyle::from_config(&config.wireframe),
            settings: RenderSettings::default(),
            target: RgbImage::from_pixel(width, height, image::Rgb(config.render.clear_color)),
            stats: FrameStats::default(),
            last_frame: None,
            last_transform: None,
            last_export: None,
            recorder: None,
            texture,
            mesh,
            config,
        })
    }

    /// Render one tick.
    ///
    /// `detection` is `None` when the detector found no face; the background
    /// is shown without a mask. A malformed frame is rejected with
    /// [`Error::InvalidFrame`](crate::Error::InvalidFrame) and leaves the
    /// previous output and all state untouched, so the caller can keep going.
    pub fn process_frame(&mut self, detection: Option<&PoseFrame>, background: Option<&RgbImage>) -> Result<()> {
        let background = background.filter(|_| self.settings.background);

        let Some(raw) = detection else {
            self.compositor.begin_frame(&mut self.target, background);
            self.stats.no_face += 1;
            return Ok(());
        };

        let adapted = match self.adapter.adapt_tracked(raw, self.last_frame.as_ref()) {
            Ok(adapted) => adapted,
            Err(e) => {
                log::warn!("Skipping frame at {} ms: {}", raw.timestamp_ms, e);
                self.stats.skipped += 1;
                return Err(e);
            }
        };

        let deformed = self.deformer.deform(&mut self.mesh, &adapted);
        self.camera.update(&adapted);
        let camera = self.camera.camera();

        let normals = self.mesh.vertex_normals();
        let shades = shade_vertices(
            self.settings.shading,
            self.mesh.positions(),
            &normals,
            &camera,
            &self.lights,
        );

        self.compositor.begin_frame(&mut self.target, background);
        self.rasterizer.clear();
        let color = self.settings.mask_color();
        let surface = match (&self.texture, self.mesh.uvs()) {
            (Some(texture), Some(uvs)) if self.settings.textured => Surface {
                texture: Some((texture, uvs)),
                ..Surface::flat(color)
            },
            _ => Surface::flat(color),
        };
        let raster = self.rasterizer.draw_mesh(
            &mut self.target,
            &self.mesh,
            &camera,
            &shades,
            &surface,
            self.settings.shading,
            &self.wire,
        );
        if self.settings.landmarks {
            self.compositor.draw_landmarks(&mut self.target, &adapted.pixels);
        }

        log::debug!(
            "frame {} at {} ms: {} drawn, {} culled, {} clipped, offset {:.1} mm",
            self.stats.rendered,
            raw.timestamp_ms,
            raster.drawn,
            raster.culled,
            raster.clipped,
            self.camera.state().current_offset
        );

        self.record(raw, &adapted);

        self.stats.rendered += 1;
        self.stats.clamped += deformed.clamped as u64;
        self.stats.last_raster = raster;
        self.last_transform = Some(raw.transform);
        self.last_frame = Some(adapted);
        Ok(())
    }

    fn record(&mut self, raw: &PoseFrame, adapted: &AdaptedFrame) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        let camera = self.camera.camera();
        let record = SessionRecord::capture(
            self.stats.rendered,
            [self.config.render.width, self.config.render.height],
            raw,
            adapted,
            self.camera.state(),
            [camera.position.x, camera.position.y, camera.position.z],
            &camera.view_matrix(),
            &self.camera.intrinsics(),
        );
        if let Err(e) = recorder.append(&record) {
            log::error!("Recording stopped: {}", e);
            self.recorder = None;
        }
    }

    /// Apply a user command between frames
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Export => {
                self.export()?;
            }
            Command::ToggleRecording => self.toggle_recording()?,
            _ => {}
        }
        let settings = self.settings.apply(command);
        if settings != self.settings {
            log::info!("{:?}: {:?}", command, settings);
        }
        self.settings = settings;
        self.camera.set_follow(settings.follow);
        Ok(())
    }

    /// Write the current deformed mesh as OBJ into the export directory
    pub fn export(&mut self) -> Result<PathBuf> {
        let dir = &self.config.output.export_dir;
        match export_obj(&self.mesh, self.last_transform.as_ref(), dir, self.stats.rendered) {
            Ok(path) => {
                self.last_export = Some(path.clone());
                Ok(path)
            }
            Err(e) => {
                log::error!("{}", e);
                Err(e)
            }
        }
    }

    /// Start or stop appending frames to the session log
    pub fn toggle_recording(&mut self) -> Result<()> {
        match self.recorder.take() {
            Some(recorder) => {
                log::info!(
                    "Recorded {} frames to {}",
                    recorder.records_written(),
                    recorder.path().display()
                );
            }
            None => {
                self.recorder = Some(SessionRecorder::open(&self.config.output.session_log)?);
            }
        }
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Count detector frames dropped upstream of the session
    pub fn set_dropped(&mut self, dropped: u64) {
        self.stats.dropped = dropped;
    }

    /// The most recent output frame
    pub fn frame(&self) -> &RgbImage {
        &self.target
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn camera_state(&self) -> &CameraState {
        self.camera.state()
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    /// Adapted landmarks of the last rendered frame; the next frame is
    /// tracked against these
    pub fn last_frame(&self) -> Option<&AdaptedFrame> {
        self.last_frame.as_ref()
    }

    pub fn last_export(&self) -> Option<&PathBuf> {
        self.last_export.as_ref()
    }
}

impl std::fmt::Debug for MaskSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskSession")
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shading::ShadingMode;
    use crate::Error;
    use crate::synthetic::SwayingHead;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.render.width = 160;
        config.render.height = 90;
        config.mesh.path = PathBuf::from("/nonexistent/mask.obj");
        config
    }

    #[test]
    fn test_missing_mesh_falls_back() {
        let session = MaskSession::new(small_config()).unwrap();
        assert_eq!(session.mesh().vertex_count(), crate::LANDMARK_COUNT);
        assert!(!session.has_texture());
    }

    #[test]
    fn test_missing_mesh_without_fallback_fails() {
        let mut config = small_config();
        config.mesh.fallback_to_builtin = false;
        assert!(matches!(MaskSession::new(config), Err(Error::AssetLoadError { .. })));
    }

    #[test]
    fn test_frame_renders_mask() {
        let config = small_config();
        let mut session = MaskSession::new(config.clone()).unwrap();
        let head = SwayingHead::new(session.mesh(), &config).still();

        session.process_frame(Some(&head.frame_at(0)), None).unwrap();
        let clear = image::Rgb(config.render.clear_color);
        assert_ne!(*session.frame().get_pixel(80, 45), clear);
        assert_eq!(session.stats().rendered, 1);
        assert!(session.stats().last_raster.drawn > 0);
    }

    #[test]
    fn test_no_face_shows_background_only() {
        let config = small_config();
        let mut session = MaskSession::new(config.clone()).unwrap();
        session.process_frame(None, None).unwrap();
        let clear = image::Rgb(config.render.clear_color);
        assert!(session.frame().pixels().all(|p| *p == clear));
        assert_eq!(session.stats().no_face, 1);
    }

    #[test]
    fn test_follow_command_reaches_camera() {
        let mut session = MaskSession::new(small_config()).unwrap();
        session.apply(Command::ToggleFollow).unwrap();
        assert!(!session.settings().follow);
        session.apply(Command::SelectShading(ShadingMode::Wireframe)).unwrap();
        assert_eq!(session.settings().shading, ShadingMode::Wireframe);
    }
}
