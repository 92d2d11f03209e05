//! Local Tesseract OCR engine.

use crate::engine::OcrEngine;
use crate::error::{CaptchaError, Result};
use crate::preprocess::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use platecheck_core::CaptchaAnswer;
use tokio::process::Command;

/// Characters the site uses in its CAPTCHA images.
pub const CHAR_WHITELIST: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const ENGINE_ID: &str = "tesseract";

/// Runs the `tesseract` CLI on a temporary PNG.
///
/// Recognition is constrained to a single text line (`--psm 7`) with the
/// LSTM engine and [`CHAR_WHITELIST`].
pub struct TesseractEngine {
    binary: String,
    language: String,
}

impl TesseractEngine {
    /// Create an engine using `tesseract` from `PATH` and English data.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary("tesseract", "eng")
    }

    /// Create an engine with a specific executable and language.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    fn command_args(&self, image_path: &str) -> Vec<String> {
        vec![
            image_path.to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            "7".to_string(),
            "--oem".to_string(),
            "1".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={CHAR_WHITELIST}"),
        ]
    }

    fn engine_error(message: impl Into<String>) -> CaptchaError {
        CaptchaError::EngineFailed {
            engine: ENGINE_ID.to_string(),
            message: message.into(),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &DynamicImage) -> Result<CaptchaAnswer> {
        let png = encode_png(image)?;

        // Kept alive until the process exits; removed on drop.
        let file = tempfile::Builder::new()
            .prefix("captcha-")
            .suffix(".png")
            .tempfile()?;
        tokio::fs::write(file.path(), &png).await?;

        let path = file.path().to_string_lossy().into_owned();
        let output = Command::new(&self.binary)
            .args(self.command_args(&path))
            .output()
            .await
            .map_err(|e| Self::engine_error(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::engine_error(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(raw = %text.trim(), "tesseract output");

        CaptchaAnswer::from_ocr_text(&text).map_err(|_| CaptchaError::EmptyResult {
            engine: ENGINE_ID.to_string(),
        })
    }

    fn engine_id(&self) -> &str {
        ENGINE_ID
    }

    fn is_local(&self) -> bool {
        true
    }
}
