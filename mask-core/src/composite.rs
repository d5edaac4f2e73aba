/// Background and overlay composition around the rasterized mask
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use nalgebra::Point3;

/// Colour of the raw landmark overlay
pub const LANDMARK_COLOR: Rgb<u8> = Rgb([40, 255, 80]);

/// Prepares the render target and draws overlays on top of the mesh
#[derive(Debug, Clone)]
pub struct Compositor {
    clear_color: Rgb<u8>,
}

impl Compositor {
    pub fn new(clear_color: [u8; 3]) -> Self {
        Self {
            clear_color: Rgb(clear_color),
        }
    }

    /// Overwrite the whole target with the background frame or the clear colour
    pub fn begin_frame(&self, target: &mut RgbImage, background: Option<&RgbImage>) {
        match background {
            Some(frame) if frame.dimensions() == target.dimensions() => {
                target.copy_from_slice(frame.as_raw());
            }
            Some(frame) => {
                let resized = imageops::resize(frame, target.width(), target.height(), FilterType::Triangle);
                target.copy_from_slice(resized.as_raw());
            }
            None => {
                for pixel in target.pixels_mut() {
                    *pixel = self.clear_color;
                }
            }
        }
    }

    /// Plot pixel-space landmarks as small dots
    pub fn draw_landmarks(&self, target: &mut RgbImage, pixels: &[Point3<f32>]) {
        let (w, h) = target.dimensions();
        for p in pixels {
            if !(p.x.is_finite() && p.y.is_finite()) {
                continue;
            }
            let (x0, y0) = (p.x.round() as i64, p.y.round() as i64);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (x0 + dx, y0 + dy);
                if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                    target.put_pixel(x as u32, y as u32, LANDMARK_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_without_background() {
        let compositor = Compositor::new([1, 2, 3]);
        let mut target = RgbImage::from_pixel(4, 4, Rgb([200; 3]));
        compositor.begin_frame(&mut target, None);
        assert!(target.pixels().all(|p| *p == Rgb([1, 2, 3])));
    }

    #[test]
    fn test_background_resized_to_target() {
        let compositor = Compositor::new([0; 3]);
        let background = RgbImage::from_pixel(2, 2, Rgb([50, 60, 70]));
        let mut target = RgbImage::new(8, 6);
        compositor.begin_frame(&mut target, Some(&background));
        assert_eq!(*target.get_pixel(4, 3), Rgb([50, 60, 70]));
    }

    #[test]
    fn test_landmarks_clipped_to_target() {
        let compositor = Compositor::new([0; 3]);
        let mut target = RgbImage::new(4, 4);
        compositor.draw_landmarks(
            &mut target,
            &[Point3::new(1.0, 1.0, 0.0), Point3::new(-10.0, 50.0, 0.0), Point3::new(3.2, 3.4, 0.0)],
        );
        assert_eq!(*target.get_pixel(1, 1), LANDMARK_COLOR);
        assert_eq!(*target.get_pixel(2, 2), LANDMARK_COLOR);
        assert_eq!(*target.get_pixel(3, 3), LANDMARK_COLOR);
        assert_eq!(*target.get_pixel(0, 3), Rgb([0, 0, 0]));
    }
}
