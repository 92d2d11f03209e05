//! OCR.space cloud OCR engine, used as the fallback tier.

use crate::engine::OcrEngine;
use crate::error::{CaptchaError, Result};
use crate::preprocess::encode_jpeg;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use platecheck_core::CaptchaAnswer;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const ENGINE_ID: &str = "ocr-space";

/// OCR.space API client.
///
/// Uploads the processed image as a base64 JPEG data URI. Without an API
/// key the engine is still constructed but every call fails, so the chain
/// reports a clear reason instead of silently skipping the tier.
pub struct OcrSpaceEngine {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    jpeg_quality: u8,
}

impl OcrSpaceEngine {
    /// Default public endpoint.
    pub const DEFAULT_URL: &'static str = "https://api.ocr.space/parse/image";

    /// Create an engine against the public endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_url(Self::DEFAULT_URL, api_key, Duration::from_secs(20))
    }

    /// Create an engine with a custom endpoint and request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_url(
        api_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptchaError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            jpeg_quality: 95,
        })
    }

    /// Set the JPEG quality used for uploads.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    fn data_uri(jpeg: &[u8]) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
    }

    /// Convert an API response into an answer.
    fn convert_api_response(response: OcrSpaceResponse) -> Result<CaptchaAnswer> {
        if response.is_errored_on_processing {
            return Err(CaptchaError::ProcessingError {
                engine: ENGINE_ID.to_string(),
                message: response.error_message(),
            });
        }

        let first = response
            .parsed_results
            .into_iter()
            .next()
            .ok_or_else(|| CaptchaError::EmptyResult {
                engine: ENGINE_ID.to_string(),
            })?;

        CaptchaAnswer::from_ocr_text(&first.parsed_text).map_err(|_| CaptchaError::EmptyResult {
            engine: ENGINE_ID.to_string(),
        })
    }
}

#[async_trait]
impl OcrEngine for OcrSpaceEngine {
    async fn recognize(&self, image: &DynamicImage) -> Result<CaptchaAnswer> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| CaptchaError::MissingApiKey {
                engine: ENGINE_ID.to_string(),
            })?;

        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        let form = Form::new()
            .text("apikey", api_key.clone())
            .text("base64image", Self::data_uri(&jpeg));

        let response = self.client.post(&self.api_url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CaptchaError::ApiError {
                engine: ENGINE_ID.to_string(),
                status: status.as_u16(),
                message: error_text,
            });
        }

        let api_response: OcrSpaceResponse =
            response.json().await.map_err(|e| CaptchaError::ParseError {
                engine: ENGINE_ID.to_string(),
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::convert_api_response(api_response)
    }

    fn engine_id(&self) -> &str {
        ENGINE_ID
    }

    fn is_local(&self) -> bool {
        false
    }
}

// OCR.space API types

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct OcrSpaceResponse {
    parsed_results: Vec<ParsedResult>,
    is_errored_on_processing: bool,
    /// A string or a list of strings depending on the failure.
    error_message: serde_json::Value,
}

impl OcrSpaceResponse {
    fn error_message(&self) -> String {
        match &self.error_message {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
            serde_json::Value::Null => "unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ParsedResult {
    parsed_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn parse(json: &str) -> OcrSpaceResponse {
        serde_json::from_str(json).expect("valid response JSON")
    }

    #[test]
    fn test_engine_creation() {
        let engine = OcrSpaceEngine::new(Some("key".to_string())).expect("create engine");
        assert_eq!(engine.engine_id(), "ocr-space");
        assert_eq!(engine.api_url, OcrSpaceEngine::DEFAULT_URL);
        assert!(!engine.is_local());
        assert_eq!(engine.jpeg_quality, 95);
    }

    #[test]
    fn test_blank_key_treated_as_missing() {
        let engine = OcrSpaceEngine::new(Some(String::new())).expect("create engine");
        assert!(engine.api_key.is_none());
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(OcrSpaceEngine::data_uri(b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_convert_first_result() {
        let response = parse(
            r#"{"ParsedResults":[{"ParsedText":"k7Pq2\r\n"},{"ParsedText":"other"}],
                "OCRExitCode":1,"IsErroredOnProcessing":false,"ErrorMessage":null}"#,
        );
        let answer = OcrSpaceEngine::convert_api_response(response).expect("answer");
        assert_eq!(answer.as_str(), "k7Pq2");
    }

    #[test]
    fn test_convert_long_noisy_text() {
        let response = parse(
            r#"{"ParsedResults":[{"ParsedText":"8fK2 xQ9m\r\nTz41 pL07 wW3"}],
                "IsErroredOnProcessing":false}"#,
        );
        let answer = OcrSpaceEngine::convert_api_response(response).expect("answer");
        assert_eq!(answer.as_str(), "8fK2xQ9mTz41pL07wW3");
    }

    #[test]
    fn test_convert_processing_error() {
        let response = parse(
            r#"{"ParsedResults":[],"IsErroredOnProcessing":true,
                "ErrorMessage":["Unable to recognize the file type","E216"]}"#,
        );
        let err = OcrSpaceEngine::convert_api_response(response).expect_err("processing error");
        match err {
            CaptchaError::ProcessingError { message, .. } => {
                assert_eq!(message, "Unable to recognize the file type; E216");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_convert_empty_results() {
        let response = parse(r#"{"ParsedResults":[],"IsErroredOnProcessing":false}"#);
        assert!(matches!(
            OcrSpaceEngine::convert_api_response(response),
            Err(CaptchaError::EmptyResult { .. })
        ));

        let response = parse(r#"{"ParsedResults":[{"ParsedText":"  \r\n"}]}"#);
        assert!(matches!(
            OcrSpaceEngine::convert_api_response(response),
            Err(CaptchaError::EmptyResult { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let engine = OcrSpaceEngine::new(None).expect("create engine");
        let image = DynamicImage::ImageLuma8(GrayImage::new(30, 10));

        assert!(matches!(
            engine.recognize(&image).await,
            Err(CaptchaError::MissingApiKey { .. })
        ));
    }
}
