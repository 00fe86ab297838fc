//! Timestamp overlay
//!
//! Stamps the wall-clock time into the top-left corner of a JPEG frame on a
//! darkened backing box. Any decode or encode failure hands back the input
//! bytes untouched, so a bad frame still reaches viewers.

mod glyphs;

use bytes::Bytes;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};

use crate::core::timestamp::overlay_label;
use glyphs::{GLYPH_HEIGHT, GLYPH_WIDTH, glyph};

const BOX_ORIGIN: u32 = 10;
const BOX_PADDING: u32 = 5;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    quality: u8,
    opacity: f32,
    scale: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(80, 0.6)
    }
}

impl OverlayRenderer {
    pub fn new(quality: u8, opacity: f32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            opacity: opacity.clamp(0.0, 1.0),
            scale: 2,
        }
    }

    /// Never fails: on error the original encoded frame comes back.
    pub fn render(&self, encoded: &Bytes, at: &DateTime<Local>) -> Bytes {
        match self.try_render(encoded, &overlay_label(at)) {
            Ok(out) => out,
            Err(e) => {
                log::debug!("[overlay] passthrough ({} bytes): {}", encoded.len(), e);
                encoded.clone()
            }
        }
    }

    fn try_render(&self, encoded: &[u8], label: &str) -> image::ImageResult<Bytes> {
        let mut img = image::load_from_memory_with_format(encoded, ImageFormat::Jpeg)?.to_rgb8();
        self.stamp(&mut img, label);

        let mut out = Vec::with_capacity(encoded.len());
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&img)?;
        Ok(Bytes::from(out))
    }

    pub fn stamp(&self, img: &mut RgbImage, label: &str) {
        let (text_w, text_h) = self.text_size(label);
        let x1 = BOX_ORIGIN + 2 * BOX_PADDING + text_w;
        let y1 = BOX_ORIGIN + 2 * BOX_PADDING + text_h;
        self.shade(img, BOX_ORIGIN, BOX_ORIGIN, x1, y1);
        self.draw_text(
            img,
            BOX_ORIGIN + BOX_PADDING,
            BOX_ORIGIN + BOX_PADDING,
            label,
        );
    }

    fn text_size(&self, label: &str) -> (u32, u32) {
        let n = label.chars().count() as u32;
        if n == 0 {
            return (0, GLYPH_HEIGHT * self.scale);
        }
        let advance = (GLYPH_WIDTH + 1) * self.scale;
        (n * advance - self.scale, GLYPH_HEIGHT * self.scale)
    }

    fn shade(&self, img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        let keep = 1.0 - self.opacity;
        let x1 = x1.min(img.width());
        let y1 = y1.min(img.height());
        for y in y0..y1 {
            for x in x0..x1 {
                let px = img.get_pixel_mut(x, y);
                for c in px.0.iter_mut() {
                    *c = (*c as f32 * keep).round() as u8;
                }
            }
        }
    }

    fn draw_text(&self, img: &mut RgbImage, x0: u32, y0: u32, label: &str) {
        let advance = (GLYPH_WIDTH + 1) * self.scale;
        for (i, c) in label.chars().enumerate() {
            let gx = x0 + i as u32 * advance;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (0x10 >> col) == 0 {
                        continue;
                    }
                    self.fill_cell(img, gx + col * self.scale, y0 + row as u32 * self.scale);
                }
            }
        }
    }

    fn fill_cell(&self, img: &mut RgbImage, x: u32, y: u32) {
        for dy in 0..self.scale {
            for dx in 0..self.scale {
                let (px, py) = (x + dx, y + dy);
                if px < img.width() && py < img.height() {
                    img.put_pixel(px, py, TEXT_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gray_jpeg(w: u32, h: u32, level: u8) -> Bytes {
        let img = RgbImage::from_pixel(w, h, Rgb([level, level, level]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        Bytes::from(out)
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 19, 13, 5, 9).unwrap()
    }

    #[test]
    fn undecodable_input_is_returned_verbatim() {
        let garbage = Bytes::from_static(b"definitely not a jpeg");
        let out = OverlayRenderer::default().render(&garbage, &at());
        assert_eq!(out, garbage);
    }

    #[test]
    fn empty_input_is_returned_verbatim() {
        let empty = Bytes::new();
        assert_eq!(OverlayRenderer::default().render(&empty, &at()), empty);
    }

    #[test]
    fn rendered_frame_is_a_decodable_jpeg_of_same_size() {
        let src = gray_jpeg(320, 180, 200);
        let out = OverlayRenderer::default().render(&src, &at());
        assert_ne!(out, src);

        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (320, 180));

        // Backing box darkens the corner; far corner keeps its level.
        let corner = decoded.get_pixel(12, 12).0[0];
        let far = decoded.get_pixel(310, 170).0[0];
        assert!(corner < 140, "corner level {}", corner);
        assert!(far > 180, "far level {}", far);
    }

    #[test]
    fn stamp_clips_to_tiny_images() {
        let mut img = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        OverlayRenderer::default().stamp(&mut img, "2025-10-19 13:05:09");
        assert_eq!(img.dimensions(), (16, 16));
    }

    #[test]
    fn text_size_grows_with_label() {
        let r = OverlayRenderer::default();
        let (w1, h1) = r.text_size("1");
        let (w2, h2) = r.text_size("12");
        assert_eq!(h1, h2);
        assert_eq!(w2 - w1, (GLYPH_WIDTH + 1) * 2);
    }
}
