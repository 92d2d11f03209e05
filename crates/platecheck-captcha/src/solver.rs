//! CAPTCHA solving through an ordered chain of OCR engines.

use crate::engine::{CaptchaImageSource, OcrEngine};
use crate::engines::{OcrSpaceEngine, TesseractEngine};
use crate::error::{CaptchaError, Result};
use crate::preprocess::Preprocessor;
use async_trait::async_trait;
use platecheck_core::{CaptchaAnswer, OcrConfig};
use std::sync::Arc;
use std::time::Duration;

/// Trait for turning a CAPTCHA image source into an answer.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Fetch an image from `source` and recognise it.
    ///
    /// # Errors
    /// Returns error if the image cannot be fetched or no engine produces
    /// an answer.
    async fn solve(&self, source: &dyn CaptchaImageSource) -> Result<CaptchaAnswer>;
}

/// Solver that tries each engine in registration order.
///
/// The image is downloaded and preprocessed once; every engine sees the
/// same processed image. The first usable answer wins.
pub struct OcrChainSolver {
    preprocessor: Preprocessor,
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl OcrChainSolver {
    /// Create a solver with no engines.
    #[must_use]
    pub fn new(preprocessor: Preprocessor) -> Self {
        Self {
            preprocessor,
            engines: Vec::new(),
        }
    }

    /// Build the standard chain: local Tesseract, then OCR.space.
    ///
    /// # Errors
    /// Returns error if the cloud engine's HTTP client cannot be created.
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let tesseract = TesseractEngine::with_binary(&config.tesseract_path, &config.language);
        let ocr_space = OcrSpaceEngine::with_url(
            &config.api_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_jpeg_quality(config.jpeg_quality);

        if config.api_key.is_none() {
            tracing::warn!("OCR_API_KEY not set; cloud OCR fallback will fail");
        }

        Ok(Self::new(Preprocessor::new(config.contrast))
            .with_engine(Arc::new(tesseract))
            .with_engine(Arc::new(ocr_space)))
    }

    /// Add an engine to the end of the chain.
    pub fn add_engine(&mut self, engine: Arc<dyn OcrEngine>) {
        self.engines.push(engine);
    }

    /// Builder form of [`add_engine`](Self::add_engine).
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.add_engine(engine);
        self
    }

    /// Registered engines in chain order.
    #[must_use]
    pub fn engines(&self) -> &[Arc<dyn OcrEngine>] {
        &self.engines
    }
}

impl Default for OcrChainSolver {
    fn default() -> Self {
        Self::new(Preprocessor::default())
    }
}

#[async_trait]
impl CaptchaSolver for OcrChainSolver {
    async fn solve(&self, source: &dyn CaptchaImageSource) -> Result<CaptchaAnswer> {
        if self.engines.is_empty() {
            return Err(CaptchaError::NoEngines);
        }

        let bytes = source.captcha_image().await?;
        let image = self.preprocessor.process(&bytes)?;

        let mut failures = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            match engine.recognize(&image).await {
                Ok(answer) => {
                    tracing::debug!(engine = engine.engine_id(), answer = %answer, "CAPTCHA recognised");
                    return Ok(answer);
                }
                Err(e) => {
                    tracing::warn!(engine = engine.engine_id(), error = %e, "OCR engine failed");
                    failures.push(format!("{}: {e}", engine.engine_id()));
                }
            }
        }

        Err(CaptchaError::AllEnginesFailed { failures })
    }
}
