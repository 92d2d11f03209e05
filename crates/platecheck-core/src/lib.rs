//! Platecheck Core - Foundation crate for the traffic-violation lookup service.
//!
//! This crate provides the shared data model, error handling and configuration
//! management that the solver, scanner and server crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Lookup request, CAPTCHA answer and violation records
//!
//! # Example
//!
//! ```rust
//! use platecheck_core::{AppConfig, LookupRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//!
//! let request = LookupRequest::new("30A12345", "1")?;
//! assert_eq!(request.license_plate(), "30A12345");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, LookupConfig, OcrConfig, RateLimitConfig, ServerConfig, SiteConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use types::{CaptchaAnswer, LookupOutcome, LookupRequest, ResultDetails, Violation};
