//! Mask texture loading and sampling

use image::{Rgb, RgbImage};
use nalgebra::{Vector2, Vector3};
use std::path::Path;

use crate::{Error, Result};

/// An RGB texture sampled with OBJ-style UVs (`v` up)
#[derive(Debug, Clone)]
pub struct Texture {
    image: RgbImage,
}

impl Texture {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Load a PNG or JPEG texture
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| Error::asset(path, format!("Failed to load texture: {}", e)))?
            .to_rgb8();
        log::info!("Loaded texture {} ({}x{})", path.display(), image.width(), image.height());
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Bilinear sample, UVs clamp to the atlas edge; returns linear-ish
    /// colour in [0, 1]
    pub fn sample(&self, uv: Vector2<f32>) -> Vector3<f32> {
        let (w, h) = self.image.dimensions();
        let u = uv.x.clamp(0.0, 1.0);
        let v = 1.0 - uv.y.clamp(0.0, 1.0);

        let x = u * w as f32 - 0.5;
        let y = v * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let fetch = |xi: f32, yi: f32| -> Vector3<f32> {
            let xi = (xi as i64).clamp(0, w as i64 - 1) as u32;
            let yi = (yi as i64).clamp(0, h as i64 - 1) as u32;
            let Rgb([r, g, b]) = *self.image.get_pixel(xi, yi);
            Vector3::new(r as f32, g as f32, b as f32) / 255.0
        };

        let top = fetch(x0, y0).lerp(&fetch(x0 + 1.0, y0), fx);
        let bottom = fetch(x0, y0 + 1.0).lerp(&fetch(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(&bottom, fy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Texture {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 0]));
        image.put_pixel(0, 1, Rgb([0, 0, 255]));
        image.put_pixel(1, 1, Rgb([255, 255, 255]));
        Texture::new(image)
    }

    #[test]
    fn test_texel_centres() {
        let tex = checker();
        // v points up, so v = 0.75 is the top row
        let red = tex.sample(Vector2::new(0.25, 0.75));
        assert!((red - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-5);
        let white = tex.sample(Vector2::new(0.75, 0.25));
        assert!((white - Vector3::new(1.0, 1.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let tex = checker();
        let mid = tex.sample(Vector2::new(0.5, 0.75));
        assert!((mid - Vector3::new(0.5, 0.5, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_atlas_border_samples_own_edge() {
        let mut image = RgbImage::from_pixel(4, 4, Rgb([0, 255, 0]));
        for x in 0..4 {
            image.put_pixel(x, 0, Rgb([255, 0, 0]));
            image.put_pixel(x, 3, Rgb([0, 0, 255]));
        }
        let tex = Texture::new(image);
        let red = Vector3::new(1.0, 0.0, 0.0);
        let blue = Vector3::new(0.0, 0.0, 1.0);

        assert!((tex.sample(Vector2::new(0.5, 1.0)) - red).norm() < 1e-5);
        assert!((tex.sample(Vector2::new(0.5, 0.999)) - red).norm() < 1e-5);
        assert!((tex.sample(Vector2::new(0.5, 0.0)) - blue).norm() < 1e-5);
        assert!((tex.sample(Vector2::new(1.0, 1.0)) - red).norm() < 1e-5);
    }

    #[test]
    fn test_missing_file_is_asset_error() {
        let err = Texture::load("does/not/exist.png").unwrap_err();
        assert!(matches!(err, Error::AssetLoadError { .. }));
    }
}
