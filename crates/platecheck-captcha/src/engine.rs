//! OCR engine and image source traits.

use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;
use platecheck_core::CaptchaAnswer;

/// Trait for OCR backends.
///
/// Engines receive an already preprocessed image and either return a usable
/// answer or fail; an empty recognition result is a failure. Implementations
/// must be thread-safe (Send + Sync) for use in async contexts.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise the CAPTCHA text in `image`.
    ///
    /// # Errors
    /// Returns error if the engine cannot run or finds no usable text.
    async fn recognize(&self, image: &DynamicImage) -> Result<CaptchaAnswer>;

    /// Get the unique identifier for this engine.
    fn engine_id(&self) -> &str;

    /// Whether the engine runs on this machine (no per-call cost, no upload).
    fn is_local(&self) -> bool;
}

/// Something that can hand out a fresh CAPTCHA image.
///
/// The lookup session implements this so that the image is fetched with the
/// session's cookie jar and the answer stays bound to that session.
#[async_trait]
pub trait CaptchaImageSource: Send + Sync {
    /// Download the raw CAPTCHA image bytes.
    async fn captcha_image(&self) -> Result<Vec<u8>>;
}
