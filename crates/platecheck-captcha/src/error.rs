//! Error types for the CAPTCHA subsystem.

use thiserror::Error;

/// Errors that can occur while fetching or recognising a CAPTCHA.
#[derive(Error, Debug)]
pub enum CaptchaError {
    /// The CAPTCHA image could not be downloaded
    #[error("failed to download CAPTCHA image: {message}")]
    Download {
        /// Error message
        message: String,
    },

    /// Image decoding or encoding failed
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// An OCR engine could not run
    #[error("OCR engine error ({engine}): {message}")]
    EngineFailed {
        /// Engine identifier
        engine: String,
        /// Error message
        message: String,
    },

    /// An OCR engine ran but recognised nothing usable
    #[error("OCR engine {engine} found no text")]
    EmptyResult {
        /// Engine identifier
        engine: String,
    },

    /// API error with status code
    #[error("API error ({engine}): status {status}, {message}")]
    ApiError {
        /// Engine identifier
        engine: String,
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// The cloud API reported a processing error
    #[error("OCR processing error ({engine}): {message}")]
    ProcessingError {
        /// Engine identifier
        engine: String,
        /// Error message reported by the API
        message: String,
    },

    /// Response parsing error
    #[error("failed to parse response from {engine}: {message}")]
    ParseError {
        /// Engine identifier
        engine: String,
        /// Error message
        message: String,
    },

    /// No API key configured for a cloud engine
    #[error("no API key configured for {engine}")]
    MissingApiKey {
        /// Engine identifier
        engine: String,
    },

    /// Every engine in the chain failed
    #[error("all OCR engines failed: {}", .failures.join("; "))]
    AllEnginesFailed {
        /// One entry per engine, in chain order
        failures: Vec<String>,
    },

    /// The solver has no engines registered
    #[error("no OCR engine configured")]
    NoEngines,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (temporary files, subprocess)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for CAPTCHA operations.
pub type Result<T> = std::result::Result<T, CaptchaError>;
