//! Image cleanup before recognition.

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Decodes CAPTCHA bytes into a single-channel, contrast-boosted image.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    contrast: f32,
}

impl Preprocessor {
    /// Contrast boost used by the site's CAPTCHA tuning, in percent.
    pub const DEFAULT_CONTRAST: f32 = 20.0;

    /// Create a preprocessor with the given contrast boost in percent.
    #[must_use]
    pub fn new(contrast: f32) -> Self {
        Self { contrast }
    }

    /// Decode, convert to 8-bit grayscale and boost contrast.
    ///
    /// The output is always `ImageLuma8` so it can be encoded as both PNG
    /// and JPEG.
    pub fn process(&self, bytes: &[u8]) -> Result<DynamicImage> {
        let decoded = image::load_from_memory(bytes)?;
        let mut gray = decoded.to_luma8();
        let lut = contrast_lut(self.contrast);
        for pixel in gray.pixels_mut() {
            pixel.0[0] = lut[usize::from(pixel.0[0])];
        }
        Ok(DynamicImage::ImageLuma8(gray))
    }
}

/// Lookup table stretching values linearly around mid-gray by `percent`.
///
/// `percent` is clamped to -100..=100; +20 scales the distance from
/// mid-gray by 1.2.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn contrast_lut(percent: f32) -> [u8; 256] {
    let factor = (100.0 + f64::from(percent.clamp(-100.0, 100.0))) / 100.0;
    let mut lut = [0u8; 256];
    for (value, slot) in (0u8..=255).zip(lut.iter_mut()) {
        let scaled = (f64::from(value) - 127.5) * factor + 127.5;
        *slot = scaled.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONTRAST)
    }
}

/// Encode an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode an image as JPEG with the given quality (1-100).
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    image.write_with_encoder(encoder)?;
    Ok(buf)
}
