//! Platecheck Scanner - violation lookup orchestration.
//!
//! This crate drives a lookup against the traffic police search form. It
//! opens an isolated session per attempt, has the CAPTCHA solved, submits the
//! form, and parses the result page into violation records. Failures are
//! handled with bounded retries: CAPTCHA rejections get a new session, and
//! result page downloads back off exponentially.
//!
//! # Features
//!
//! - Fresh cookie jar per CAPTCHA attempt, up to 9 attempts
//! - Tolerant decoding of the site's submit response (BOM, bare `404`, loose `success` flag)
//! - Label-driven extraction of violation records with Vietnamese text normalization
//! - Token-bucket rate limiting, global and per client with idle eviction
//!
//! # Example
//!
//! ```rust,ignore
//! use platecheck_scanner::{HttpSessionFactory, LookupOrchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = LookupOrchestrator::new(
//!     Arc::new(HttpSessionFactory::new(&config.site)?),
//!     Arc::new(OcrChainSolver::from_config(&config.ocr)?),
//! )?;
//!
//! let request = LookupRequest::new("30A12345", "1")?;
//! let outcome = orchestrator.check_license_plate(&request).await?;
//! println!("{} violations", outcome.violation_count());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod error;
pub mod normalize;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod parser;
pub mod ratelimit;
pub mod retry;
pub mod session;
pub mod submit;

// Re-export commonly used types
pub use error::{LookupError, Result};
pub use normalize::{normalize_label, normalize_multiline, remove_diacritics};
pub use orchestrator::{LookupOrchestrator, MAX_CAPTCHA_ATTEMPTS};
pub use parser::ResultExtractor;
pub use ratelimit::{ClientRateLimiter, TokenBucket};
pub use retry::{Attempted, Backoff, RetryError, RetryPolicy};
pub use session::{HttpSessionFactory, HttpSiteSession, LookupForm, SessionFactory, SiteEndpoints, SiteSession};
pub use submit::{decode_submit_response, SubmitOutcome};
