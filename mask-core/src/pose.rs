//! Conversion of raw detector output into renderer coordinates.
//!
//! Two frames of reference come out of here: pixel space (the render target,
//! origin top-left, y down) and model space (millimetres, right-handed, y up,
//! camera looking down -Z). Model space is centred horizontally on the face so
//! that the camera controller, not the mesh, carries the face's horizontal
//! position.
//!
//! The face bounds only take landmarks that moved with the rest of the face
//! since the previous frame, so a single glitching landmark shifts neither the
//! model-space origin nor the camera target.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Vector3};

use crate::config::Config;
use crate::{Error, Result, EXPRESSION_COUNT, LANDMARK_COUNT};

/// Tolerance on the homogeneous last row of the pose transform
const AFFINE_TOLERANCE: f32 = 1e-4;
/// Below this |det| the rotation block is treated as singular
const SINGULAR_TOLERANCE: f32 = 1e-6;
/// Allowed drift of R^T R from identity before re-orthonormalising
const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

/// One frame of detector output
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    /// Normalised landmarks: x, y in [0, 1], z relative depth scaled like x
    pub landmarks: Vec<Point3<f32>>,
    /// Head rotation and translation (mm)
    pub transform: Matrix4<f32>,
    /// Blend-shape activations in [0, 1]; empty if the detector has none
    pub expressions: Vec<f32>,
    pub timestamp_ms: u64,
}

/// Pixel-space bounding box of the landmarks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl FaceBounds {
    /// Bounding box of `points`, `None` if there are none
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Point3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let start = FaceBounds {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(points.fold(start, |b, p| FaceBounds {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }

    pub fn center_x(&self) -> f32 {
        (self.min_x + self.max_x) * 0.5
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }
}

/// A validated frame in renderer coordinates
#[derive(Debug, Clone)]
pub struct AdaptedFrame {
    /// Landmarks in render-target pixels; z scaled like x
    pub pixels: Vec<Point3<f32>>,
    /// Landmarks in model space (mm)
    pub model: Vec<Point3<f32>>,
    pub rotation: Rotation3<f32>,
    pub translation: Vector3<f32>,
    pub expressions: Vec<f32>,
    pub bounds: FaceBounds,
    pub timestamp_ms: u64,
}

/// Validates detector frames and maps them into pixel and model space
#[derive(Debug, Clone)]
pub struct PoseAdapter {
    width: f32,
    height: f32,
    mirror: bool,
    mm_per_px: f32,
    /// Largest pixel deviation from the face's common motion
    outlier_px: f32,
}

impl PoseAdapter {
    pub fn new(config: &Config) -> Self {
        let width = config.render.width as f32;
        let fx = config.camera.focal_length_mm / config.camera.sensor_width_mm * width;
        let mm_per_px = config.camera.base_depth / fx;
        Self {
            width,
            height: config.render.height as f32,
            mirror: config.render.mirror,
            mm_per_px,
            outlier_px: config.deform.max_displacement / mm_per_px,
        }
    }

    /// Millimetres covered by one pixel at the base camera depth
    pub fn mm_per_px(&self) -> f32 {
        self.mm_per_px
    }

    /// Validate and map a frame with no tracking history
    pub fn adapt(&self, frame: &PoseFrame) -> Result<AdaptedFrame> {
        self.adapt_tracked(frame, None)
    }

    /// Validate and map a frame, using `previous` to keep glitching landmarks
    /// out of the face bounds
    pub fn adapt_tracked(&self, frame: &PoseFrame, previous: Option<&AdaptedFrame>) -> Result<AdaptedFrame> {
        if frame.landmarks.len() != LANDMARK_COUNT {
            return Err(Error::InvalidFrame(format!(
                "expected {} landmarks, got {}",
                LANDMARK_COUNT,
                frame.landmarks.len()
            )));
        }
        if let Some(i) = frame.landmarks.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(Error::InvalidFrame(format!("landmark {i} is not finite")));
        }

        let (rotation, translation) = validate_transform(&frame.transform)?;
        let (rotation, translation) = if self.mirror {
            mirror_pose(&rotation, &translation)
        } else {
            (rotation, translation)
        };
        let expressions = validate_expressions(&frame.expressions)?;

        let pixels: Vec<Point3<f32>> = frame.landmarks.iter().map(|lm| self.to_pixel(lm)).collect();
        let steady = match previous {
            Some(prev) if prev.pixels.len() == pixels.len() => steady_landmarks(&prev.pixels, &pixels, self.outlier_px),
            _ => vec![true; pixels.len()],
        };
        let unsteady = steady.iter().filter(|s| !**s).count();
        if unsteady > 0 {
            log::debug!("{} landmarks left out of the face bounds", unsteady);
        }
        let bounds = FaceBounds::enclosing(pixels.iter().zip(&steady).filter(|(_, s)| **s).map(|(p, _)| p))
            .or_else(|| FaceBounds::enclosing(&pixels))
            .ok_or_else(|| Error::InvalidFrame("no landmarks".to_string()))?;

        let center_x = bounds.center_x();
        let half_height = self.height * 0.5;
        let model = pixels
            .iter()
            .map(|p| {
                Point3::new(
                    (p.x - center_x) * self.mm_per_px,
                    -(p.y - half_height) * self.mm_per_px,
                    -p.z * self.mm_per_px,
                )
            })
            .collect();

        Ok(AdaptedFrame {
            pixels,
            model,
            rotation,
            translation,
            expressions,
            bounds,
            timestamp_ms: frame.timestamp_ms,
        })
    }

    fn to_pixel(&self, lm: &Point3<f32>) -> Point3<f32> {
        let x = lm.x * self.width;
        let x = if self.mirror { self.width - 1.0 - x } else { x };
        Point3::new(x, lm.y * self.height, lm.z * self.width)
    }
}

/// Per-axis median of the displacements from `from` to `to`.
///
/// This is the motion the face as a whole made; a handful of outliers cannot
/// drag it.
pub(crate) fn common_motion(from: &[Point3<f32>], to: &[Point3<f32>]) -> Vector3<f32> {
    let axis = |k: usize| median(from.iter().zip(to).map(|(a, b)| b[k] - a[k]).collect());
    Vector3::new(axis(0), axis(1), axis(2))
}

fn median(mut values: Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    *values.select_nth_unstable_by(mid, f32::total_cmp).1
}

/// Flags landmarks whose motion stays within `bound` of the common motion
fn steady_landmarks(previous: &[Point3<f32>], current: &[Point3<f32>], bound: f32) -> Vec<bool> {
    let common = common_motion(previous, current);
    previous
        .iter()
        .zip(current)
        .map(|(a, b)| ((b - a) - common).norm() <= bound)
        .collect()
}

/// Reflect a head pose through the image's vertical axis
fn mirror_pose(rotation: &Rotation3<f32>, translation: &Vector3<f32>) -> (Rotation3<f32>, Vector3<f32>) {
    let flip = Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, 1.0));
    (
        Rotation3::from_matrix_unchecked(flip * rotation.matrix() * flip),
        Vector3::new(-translation.x, translation.y, translation.z),
    )
}

fn validate_transform(m: &Matrix4<f32>) -> Result<(Rotation3<f32>, Vector3<f32>)> {
    if !m.iter().all(|c| c.is_finite()) {
        return Err(Error::InvalidFrame("pose transform is not finite".to_string()));
    }
    let last_row_ok = (0..3).all(|c| m[(3, c)].abs() < AFFINE_TOLERANCE) && (m[(3, 3)] - 1.0).abs() < AFFINE_TOLERANCE;
    if !last_row_ok {
        return Err(Error::InvalidFrame(format!(
            "pose transform last row is {:?}, expected [0, 0, 0, 1]",
            [m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)]]
        )));
    }

    let block: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let det = block.determinant();
    if det.abs() < SINGULAR_TOLERANCE {
        return Err(Error::InvalidFrame("pose transform is not invertible".to_string()));
    }
    if det < 0.0 {
        return Err(Error::InvalidFrame("pose transform contains a reflection".to_string()));
    }

    let drift = (block.transpose() * block - Matrix3::identity()).norm();
    let rotation = if drift > ORTHONORMAL_TOLERANCE {
        log::debug!("re-orthonormalising pose rotation (drift {drift:.2e})");
        Rotation3::from_matrix(&block)
    } else {
        Rotation3::from_matrix_unchecked(block)
    };

    Ok((rotation, Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])))
}

fn validate_expressions(weights: &[f32]) -> Result<Vec<f32>> {
    if !weights.is_empty() && weights.len() != EXPRESSION_COUNT {
        return Err(Error::InvalidFrame(format!(
            "expected {} expression weights, got {}",
            EXPRESSION_COUNT,
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(Error::InvalidFrame("expression weight is not finite".to_string()));
    }
    Ok(weights.iter().map(|w| w.clamp(0.0, 1.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(count: usize) -> PoseFrame {
        let landmarks = (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                Point3::new(0.4 + 0.2 * t, 0.3 + 0.4 * t, 0.0)
            })
            .collect();
        PoseFrame {
            landmarks,
            transform: Matrix4::identity(),
            expressions: vec![0.5; EXPRESSION_COUNT],
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_wrong_landmark_count() {
        let adapter = PoseAdapter::new(&Config::default());
        let err = adapter.adapt(&frame(467)).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(ref m) if m.contains("467")));
    }

    #[test]
    fn test_non_finite_landmark() {
        let adapter = PoseAdapter::new(&Config::default());
        let mut f = frame(LANDMARK_COUNT);
        f.landmarks[10].y = f32::NAN;
        assert!(matches!(adapter.adapt(&f), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_singular_transform() {
        let adapter = PoseAdapter::new(&Config::default());
        let mut f = frame(LANDMARK_COUNT);
        f.transform = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(adapter.adapt(&f), Err(Error::InvalidFrame(ref m)) if m.contains("invertible")));
    }

    #[test]
    fn test_projective_last_row_rejected() {
        let adapter = PoseAdapter::new(&Config::default());
        let mut f = frame(LANDMARK_COUNT);
        f.transform[(3, 2)] = 0.5;
        assert!(adapter.adapt(&f).is_err());
    }

    #[test]
    fn test_expression_count_checked() {
        let adapter = PoseAdapter::new(&Config::default());
        let mut f = frame(LANDMARK_COUNT);
        f.expressions = vec![0.0; 51];
        assert!(adapter.adapt(&f).is_err());
        f.expressions.clear();
        assert!(adapter.adapt(&f).is_ok());
    }

    #[test]
    fn test_pixel_and_model_space() {
        let config = Config::default();
        let adapter = PoseAdapter::new(&config);
        let mut f = frame(LANDMARK_COUNT);
        f.transform = Matrix4::new_translation(&Vector3::new(0.0, 0.0, -450.0));
        let adapted = adapter.adapt(&f).unwrap();

        let first = adapted.pixels[0];
        assert!((first.x - 0.4 * 1280.0).abs() < 1e-3);
        assert!((first.y - 0.3 * 720.0).abs() < 1e-3);
        assert!((adapted.translation.z + 450.0).abs() < 1e-6);

        // Horizontally centred on the face, vertically on the screen
        let cx = adapted.bounds.center_x();
        let mmpp = adapter.mm_per_px();
        let m = adapted.model[0];
        assert!((m.x - (first.x - cx) * mmpp).abs() < 1e-3);
        assert!((m.y + (first.y - 360.0) * mmpp).abs() < 1e-3);
    }

    #[test]
    fn test_mirror_flips_x() {
        let mut config = Config::default();
        config.render.mirror = true;
        let adapter = PoseAdapter::new(&config);
        let adapted = adapter.adapt(&frame(LANDMARK_COUNT)).unwrap();
        assert!((adapted.pixels[0].x - (1279.0 - 0.4 * 1280.0)).abs() < 1e-3);
    }

    #[test]
    fn test_mirror_reverses_yaw() {
        let mut config = Config::default();
        config.render.mirror = true;
        let adapter = PoseAdapter::new(&config);
        let mut f = frame(LANDMARK_COUNT);
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), 0.4);
        f.transform = Matrix4::new_translation(&Vector3::new(30.0, 0.0, -450.0)) * yaw.to_homogeneous();

        let adapted = adapter.adapt(&f).unwrap();
        let expected = Rotation3::from_axis_angle(&Vector3::y_axis(), -0.4);
        assert!((adapted.rotation.matrix() - expected.matrix()).norm() < 1e-5);
        assert!((adapted.translation.x + 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_landmark_jump_keeps_bounds() {
        let adapter = PoseAdapter::new(&Config::default());
        let steady = adapter.adapt(&frame(LANDMARK_COUNT)).unwrap();

        let mut glitched = frame(LANDMARK_COUNT);
        glitched.landmarks[100].x = 0.98;
        let adapted = adapter.adapt_tracked(&glitched, Some(&steady)).unwrap();

        assert_eq!(adapted.bounds, steady.bounds);
        for i in (0..LANDMARK_COUNT).filter(|i| *i != 100) {
            assert_eq!(adapted.model[i], steady.model[i]);
        }
        // Without history the jump widens the box
        assert!(adapter.adapt(&glitched).unwrap().bounds.max_x > steady.bounds.max_x);
    }

    #[test]
    fn test_whole_face_motion_moves_bounds() {
        let adapter = PoseAdapter::new(&Config::default());
        let steady = adapter.adapt(&frame(LANDMARK_COUNT)).unwrap();

        let mut moved = frame(LANDMARK_COUNT);
        for lm in &mut moved.landmarks {
            lm.x += 0.3;
        }
        let adapted = adapter.adapt_tracked(&moved, Some(&steady)).unwrap();
        assert!((adapted.bounds.center_x() - steady.bounds.center_x() - 0.3 * 1280.0).abs() < 1e-2);
    }

    #[test]
    fn test_common_motion_ignores_minority() {
        let from = vec![Point3::origin(); 9];
        let mut to: Vec<_> = from.iter().map(|p| p + Vector3::new(2.0, -1.0, 0.0)).collect();
        to[3] += Vector3::new(500.0, 500.0, 500.0);
        assert_eq!(common_motion(&from, &to), Vector3::new(2.0, -1.0, 0.0));
    }

    #[test]
    fn test_drifted_rotation_is_repaired() {
        let adapter = PoseAdapter::new(&Config::default());
        let mut f = frame(LANDMARK_COUNT);
        let r = Rotation3::from_euler_angles(0.1, 0.2, 0.3).to_homogeneous();
        f.transform = r * 1.01;
        f.transform[(3, 3)] = 1.0;
        let adapted = adapter.adapt(&f).unwrap();
        let m = adapted.rotation.matrix();
        assert!((m.transpose() * m - Matrix3::identity()).norm() < 1e-4);
    }
}
