use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::producers::FrameSource;

/// Synthetic camera: a diagonal gradient with a bar sweeping across it.
pub struct TestPatternSource {
    name: String,
    width: u32,
    height: u32,
    quality: u8,
    frame_no: u64,
}

impl TestPatternSource {
    pub fn new(name: &str, width: u32, height: u32, quality: u8) -> Self {
        Self {
            name: name.to_string(),
            width: width.max(1),
            height: height.max(1),
            quality: quality.clamp(1, 100),
            frame_no: 0,
        }
    }

    fn draw(&self) -> RgbImage {
        let bar_w = (self.width / 16).max(1);
        let bar_x = (self.frame_no.wrapping_mul(4) % u64::from(self.width)) as u32;
        let (w, h) = (self.width, self.height);

        RgbImage::from_fn(w, h, |x, y| {
            if x >= bar_x && x < bar_x + bar_w {
                return Rgb([230, 230, 230]);
            }
            let r = (x * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = ((x + y) * 127 / (w + h)) as u8;
            Rgb([r, g, b])
        })
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> anyhow::Result<Bytes> {
        let img = self.draw();
        self.frame_no = self.frame_no.wrapping_add(1);

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&img)?;
        Ok(Bytes::from(out))
    }
}
