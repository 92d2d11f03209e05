//! Platecheck Server - HTTP API for violation lookups.
//!
//! Exposes a single endpoint, `POST /check-license-plate`, in front of the
//! lookup orchestrator. Each client is rate limited by its address before the
//! request body is read.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod routes;

use async_trait::async_trait;
use axum::routing::post;
use axum::Router;
use platecheck_core::{LookupOutcome, LookupRequest};
use platecheck_scanner::{ClientRateLimiter, LookupError, LookupOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use client::client_key;
pub use error::ApiError;
pub use routes::{CheckRequest, CheckResponse};

/// Path of the lookup endpoint.
pub const CHECK_PATH: &str = "/check-license-plate";

/// Anything that can answer a lookup request.
#[async_trait]
pub trait PlateLookup: Send + Sync {
    /// Run one lookup.
    async fn check_license_plate(&self, request: &LookupRequest) -> Result<LookupOutcome, LookupError>;
}

#[async_trait]
impl PlateLookup for LookupOrchestrator {
    async fn check_license_plate(&self, request: &LookupRequest) -> Result<LookupOutcome, LookupError> {
        LookupOrchestrator::check_license_plate(self, request).await
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    lookup: Arc<dyn PlateLookup>,
    client_limiter: Arc<ClientRateLimiter>,
}

impl AppState {
    /// Create state from a lookup backend and per-client limiter.
    #[must_use]
    pub fn new(lookup: Arc<dyn PlateLookup>, client_limiter: Arc<ClientRateLimiter>) -> Self {
        Self {
            lookup,
            client_limiter,
        }
    }

    /// The per-client rate limiter.
    #[must_use]
    pub fn client_limiter(&self) -> &Arc<ClientRateLimiter> {
        &self.client_limiter
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            CHECK_PATH,
            post(routes::check_license_plate).fallback(routes::method_not_allowed),
        )
        .with_state(state)
}

/// Load `.env` from the working directory or one of its parents.
///
/// Variables already set in the process environment win. Returns the file
/// that was read, if any.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

/// Load a specific env file; `false` if it is missing or malformed.
pub fn load_dotenv_from(path: &Path) -> bool {
    dotenv::from_path(path).is_ok()
}

/// Install the global tracing subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info,platecheck=debug`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,platecheck=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dotenv_file_loaded() {
        let mut file = tempfile::NamedTempFile::new().expect("create env file");
        writeln!(file, "PLATECHECK_TEST_DOTENV_KEY=from-file").expect("write env file");
        writeln!(file, "PLATECHECK_TEST_DOTENV_PRESET=from-file").expect("write env file");
        std::env::set_var("PLATECHECK_TEST_DOTENV_PRESET", "from-process");

        assert!(load_dotenv_from(file.path()));
        assert_eq!(
            std::env::var("PLATECHECK_TEST_DOTENV_KEY").as_deref(),
            Ok("from-file")
        );
        assert_eq!(
            std::env::var("PLATECHECK_TEST_DOTENV_PRESET").as_deref(),
            Ok("from-process")
        );
    }

    #[test]
    fn test_missing_dotenv_file() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        assert!(!load_dotenv_from(&dir.path().join(".env")));
    }
}
