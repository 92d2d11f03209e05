//! Lookup orchestrator for the violation search form.
//!
//! This module provides the `LookupOrchestrator` which drives one lookup:
//! the CAPTCHA solve-and-submit loop with a fresh session per attempt, and
//! the result page fetch with its own backoff.

use crate::error::{LookupError, Result};
use crate::parser::ResultExtractor;
use crate::ratelimit::TokenBucket;
use crate::retry::{Attempted, Backoff, RetryError, RetryPolicy};
use crate::session::{LookupForm, SessionFactory, SiteSession};
use crate::submit::{decode_submit_response, SubmitOutcome};
use platecheck_captcha::CaptchaSolver;
use platecheck_core::{LookupConfig, LookupOutcome, LookupRequest, ResultDetails};
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of CAPTCHA attempts per lookup.
pub const MAX_CAPTCHA_ATTEMPTS: u32 = 9;

/// Attempts for downloading the result page.
const RESULT_FETCH_ATTEMPTS: u32 = 3;

/// Delay after the first failed result page download; doubles each time.
const RESULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Orchestrates lookups against the site.
pub struct LookupOrchestrator {
    /// Opens one isolated session per attempt
    sessions: Arc<dyn SessionFactory>,
    /// Turns a session's CAPTCHA image into an answer
    solver: Arc<dyn CaptchaSolver>,
    extractor: ResultExtractor,
    /// Process-wide gate, taken once per lookup
    rate_limiter: Option<Arc<TokenBucket>>,
    captcha_policy: RetryPolicy,
    fetch_policy: RetryPolicy,
    /// Treat a total OCR failure like a rejected CAPTCHA
    retry_on_ocr_failure: bool,
}

impl LookupOrchestrator {
    /// Create an orchestrator with the default retry budgets.
    pub fn new(sessions: Arc<dyn SessionFactory>, solver: Arc<dyn CaptchaSolver>) -> Result<Self> {
        Ok(Self {
            sessions,
            solver,
            extractor: ResultExtractor::new()?,
            rate_limiter: None,
            captcha_policy: RetryPolicy::new(MAX_CAPTCHA_ATTEMPTS),
            fetch_policy: RetryPolicy::new(RESULT_FETCH_ATTEMPTS).with_backoff(Backoff::Exponential {
                base: RESULT_BACKOFF_BASE,
            }),
            retry_on_ocr_failure: false,
        })
    }

    /// Create an orchestrator using the `lookup` config section.
    pub fn from_config(
        sessions: Arc<dyn SessionFactory>,
        solver: Arc<dyn CaptchaSolver>,
        config: &LookupConfig,
    ) -> Result<Self> {
        Ok(Self::new(sessions, solver)?
            .with_captcha_attempts(config.max_captcha_attempts)
            .with_result_fetch(
                config.result_fetch_attempts,
                Duration::from_millis(config.result_backoff_base_ms),
            )
            .with_retry_on_ocr_failure(config.retry_on_ocr_failure))
    }

    /// Gate every lookup on a shared token bucket.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the CAPTCHA attempt budget.
    #[must_use]
    pub fn with_captcha_attempts(mut self, attempts: u32) -> Self {
        self.captcha_policy = RetryPolicy::new(attempts);
        self
    }

    /// Set the result page attempt budget and first backoff delay.
    #[must_use]
    pub fn with_result_fetch(mut self, attempts: u32, backoff_base: Duration) -> Self {
        self.fetch_policy =
            RetryPolicy::new(attempts).with_backoff(Backoff::Exponential { base: backoff_base });
        self
    }

    /// Retry with a new CAPTCHA when every OCR engine fails, instead of aborting.
    #[must_use]
    pub fn with_retry_on_ocr_failure(mut self, retry: bool) -> Self {
        self.retry_on_ocr_failure = retry;
        self
    }

    /// Look up violations for a plate.
    ///
    /// CAPTCHA rejections are retried with a new session up to the attempt
    /// budget. Any other failure ends the lookup. Problems reading the result
    /// page after an accepted submission are logged and yield `details: None`.
    pub async fn check_license_plate(&self, request: &LookupRequest) -> Result<LookupOutcome> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        tracing::info!(
            plate = request.license_plate(),
            vehicle_type = request.vehicle_type(),
            "Starting lookup"
        );

        let this = self;
        let retry_ocr = self.retry_on_ocr_failure;
        let result = self
            .captcha_policy
            .run(
                move |attempt| this.attempt(request, attempt),
                move |e: &LookupError| match e {
                    LookupError::CaptchaRejected => true,
                    LookupError::Captcha(_) => retry_ocr,
                    _ => false,
                },
            )
            .await;

        match result {
            Ok(Attempted { value, attempts }) => {
                tracing::info!(
                    plate = request.license_plate(),
                    attempts,
                    violations = value.violation_count(),
                    "Lookup completed"
                );
                Ok(value)
            }
            Err(RetryError::Exhausted { attempts, .. }) => {
                tracing::warn!(plate = request.license_plate(), attempts, "CAPTCHA attempts exhausted");
                Err(LookupError::ValidationExhausted { attempts })
            }
            Err(RetryError::Aborted { error, attempts }) => {
                tracing::error!(
                    plate = request.license_plate(),
                    attempt = attempts,
                    error = %error,
                    "Lookup failed"
                );
                Err(error)
            }
        }
    }

    /// One solve-and-submit round on a fresh session.
    async fn attempt(&self, request: &LookupRequest, attempt: u32) -> Result<LookupOutcome> {
        let session = self.sessions.open().await?;
        let answer = self.solver.solve(session.as_image_source()).await?;
        tracing::debug!(attempt, captcha = %answer, "CAPTCHA solved");

        let form = LookupForm {
            license_plate: request.license_plate(),
            vehicle_type: request.vehicle_type(),
            captcha: &answer,
        };
        let body = session.submit_lookup(&form).await?;

        match decode_submit_response(&body)? {
            SubmitOutcome::CaptchaRejected => {
                tracing::debug!(attempt, "CAPTCHA rejected by site");
                Err(LookupError::CaptchaRejected)
            }
            SubmitOutcome::ServerCode(code) => Err(LookupError::ServerCode { code }),
            SubmitOutcome::Accepted {
                success,
                href,
                error,
            } => {
                let details = if href.is_empty() {
                    None
                } else {
                    self.fetch_details(session.as_ref(), &href).await
                };

                Ok(LookupOutcome {
                    success,
                    href,
                    error,
                    attempts: attempt,
                    details,
                })
            }
        }
    }

    /// Fetch and parse the result page, downgrading failures to `None`.
    async fn fetch_details(&self, session: &dyn SiteSession, href: &str) -> Option<ResultDetails> {
        let extractor = &self.extractor;
        let result = self
            .fetch_policy
            .run(
                move |_| async move {
                    let html = session.fetch_result_page(href).await?;
                    Ok::<_, LookupError>(extractor.extract(&html))
                },
                LookupError::is_transient,
            )
            .await;

        match result {
            Ok(Attempted { value, .. }) => Some(value).filter(|details| !details.is_empty()),
            Err(err) => {
                let error = match err {
                    RetryError::Aborted { error, .. } => error,
                    RetryError::Exhausted { last, attempts } => LookupError::ResultFetchExhausted {
                        attempts,
                        last: Box::new(last),
                    },
                };
                tracing::warn!(href, error = %error, "Unable to read result page");
                None
            }
        }
    }
}
