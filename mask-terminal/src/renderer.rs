/// True-colour half-block output of rendered frames
use crossterm::{
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    QueueableCommand,
};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::io::Write;

/// Upper half block: foreground paints the top pixel, background the bottom one
const HALF_BLOCK: char = '\u{2580}';

/// Draws an RGB frame into a grid of terminal cells, two pixels per cell
pub struct HalfBlockRenderer {
    columns: u16,
    rows: u16,
}

impl HalfBlockRenderer {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    pub fn resize(&mut self, columns: u16, rows: u16) {
        *self = Self::new(columns, rows);
    }

    /// Pixel size the frame is scaled to before drawing
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.columns as u32, self.rows as u32 * 2)
    }

    /// Scale `frame` down to one pixel per half cell
    pub fn downsample(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = self.pixel_size();
        if frame.dimensions() == (width, height) {
            return frame.clone();
        }
        imageops::resize(frame, width, height, FilterType::Triangle)
    }

    /// Queue the frame starting at the writer's current cursor row
    pub fn draw<W: Write>(&self, writer: &mut W, frame: &RgbImage) -> std::io::Result<()> {
        let pixels = self.downsample(frame);
        let mut current: Option<(Rgb<u8>, Rgb<u8>)> = None;

        for row in 0..self.rows as u32 {
            for x in 0..self.columns as u32 {
                let top = *pixels.get_pixel(x, row * 2);
                let bottom = *pixels.get_pixel(x, row * 2 + 1);
                // Only emit colour changes
                if current != Some((top, bottom)) {
                    writer.queue(SetForegroundColor(to_color(top)))?;
                    writer.queue(SetBackgroundColor(to_color(bottom)))?;
                    current = Some((top, bottom));
                }
                writer.queue(Print(HALF_BLOCK))?;
            }
            writer.queue(ResetColor)?;
            current = None;
            writer.queue(Print("\r\n"))?;
        }
        Ok(())
    }
}

fn to_color(Rgb([r, g, b]): Rgb<u8>) -> Color {
    Color::Rgb { r, g, b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_is_two_rows_per_cell() {
        let renderer = HalfBlockRenderer::new(80, 24);
        assert_eq!(renderer.pixel_size(), (80, 48));
    }

    #[test]
    fn test_downsample_to_cells() {
        let renderer = HalfBlockRenderer::new(10, 5);
        let frame = RgbImage::from_pixel(1280, 720, Rgb([10, 20, 30]));
        let small = renderer.downsample(&frame);
        assert_eq!(small.dimensions(), (10, 10));
        assert_eq!(*small.get_pixel(5, 5), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_draw_emits_one_block_per_cell() {
        let renderer = HalfBlockRenderer::new(4, 3);
        let frame = RgbImage::from_pixel(4, 6, Rgb([200, 0, 0]));
        let mut out = Vec::new();
        renderer.draw(&mut out, &frame).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(HALF_BLOCK).count(), 12);
        assert_eq!(text.matches("\r\n").count(), 3);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let renderer = HalfBlockRenderer::new(0, 0);
        assert_eq!(renderer.pixel_size(), (1, 2));
    }
}
