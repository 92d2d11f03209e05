//! Shared types used across the lookup service.
//!
//! Everything here lives for a single lookup call: the request coming in,
//! the CAPTCHA answer produced for one attempt and the violation records
//! parsed from the result page.

use crate::error::CoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A validated lookup request: license plate plus the site's vehicle type code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    license_plate: String,
    vehicle_type: String,
}

impl LookupRequest {
    /// Create a new `LookupRequest`.
    ///
    /// Surrounding whitespace is trimmed from both fields.
    ///
    /// # Errors
    /// Returns error if the license plate is blank.
    pub fn new(
        license_plate: impl Into<String>,
        vehicle_type: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let license_plate = license_plate.into().trim().to_string();
        let vehicle_type = vehicle_type.into().trim().to_string();

        if license_plate.is_empty() {
            return Err(CoreError::Validation(
                "license plate must not be empty".to_string(),
            ));
        }

        Ok(Self {
            license_plate,
            vehicle_type,
        })
    }

    /// The license plate as submitted to the site.
    #[must_use]
    pub fn license_plate(&self) -> &str {
        &self.license_plate
    }

    /// The vehicle type code as submitted to the site.
    #[must_use]
    pub fn vehicle_type(&self) -> &str {
        &self.vehicle_type
    }
}

/// Newtype for a CAPTCHA answer.
///
/// Answers are non-empty ASCII alphanumeric strings, produced fresh for
/// every attempt and never reused. Length is not capped: a noisy OCR read is
/// still submitted and left for the site to reject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptchaAnswer(String);

impl CaptchaAnswer {
    /// Create a new `CaptchaAnswer` from an exact string.
    ///
    /// # Errors
    /// Returns error if the answer is empty or contains characters outside
    /// `[0-9A-Za-z]`.
    pub fn new(answer: impl Into<String>) -> Result<Self, CoreError> {
        let answer = answer.into();
        Self::validate(&answer)?;
        Ok(Self(answer))
    }

    /// Build an answer from raw OCR output, keeping only ASCII alphanumerics.
    ///
    /// OCR engines tend to emit stray whitespace, newlines and punctuation
    /// around the recognised characters.
    ///
    /// # Errors
    /// Returns error if nothing usable remains after cleanup.
    pub fn from_ocr_text(raw: &str) -> Result<Self, CoreError> {
        let cleaned: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
        Self::new(cleaned)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(answer: &str) -> Result<(), CoreError> {
        static ANSWER_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            ANSWER_REGEX.get_or_init(|| Regex::new(r"^[0-9A-Za-z]+$").expect("valid regex"));

        if regex.is_match(answer) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "invalid CAPTCHA answer: expected alphanumeric characters, got '{answer}'"
            )))
        }
    }
}

impl fmt::Display for CaptchaAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single traffic violation parsed from the result page.
///
/// Missing fields are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Plate as printed on the result page
    pub license_plate: String,
    /// Plate background color
    pub plate_color: String,
    /// Vehicle type label
    pub vehicle_type: String,
    /// When the violation happened
    pub violation_time: String,
    /// Where the violation happened
    pub location: String,
    /// Violation behavior description
    pub behavior: String,
    /// Processing status
    pub status: String,
    /// Unit that detected the violation
    pub detecting_unit: String,
    /// Where to resolve the case; multiple addresses are joined with `" | "`
    pub resolution_point: String,
}

/// Parsed content of the result page.
///
/// Either `violations` is populated, or `message` carries a plain-text notice
/// from the site (for example "no violations found").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDetails {
    /// Plain-text notice when no violation records were found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Violation records in page order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl ResultDetails {
    /// True when the page yielded neither records nor a message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty() && self.message.as_deref().map_or(true, str::is_empty)
    }
}

/// Final result of a lookup whose form submission was accepted by the site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOutcome {
    /// The site's success flag
    pub success: bool,
    /// Redirect target of the result page (may be empty)
    pub href: String,
    /// Error text reported by the site (may be empty)
    pub error: String,
    /// Number of CAPTCHA attempts used, starting at 1
    pub attempts: u32,
    /// Parsed result page, if it could be fetched and had content
    pub details: Option<ResultDetails>,
}

impl LookupOutcome {
    /// Number of violation records in the parsed details.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.details.as_ref().map_or(0, |d| d.violations.len())
    }
}
