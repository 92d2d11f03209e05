//! Decoding of the form submission response.

use crate::error::{LookupError, Result};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use std::fmt;

/// Bare body the site sends when the CAPTCHA answer is wrong.
pub const CAPTCHA_REJECTED_CODE: i64 = 404;

const UTF8_BOM: &str = "\u{feff}";

/// Interpreted reply to one form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The site accepted the CAPTCHA and answered with its JSON envelope
    Accepted {
        /// The site's success flag
        success: bool,
        /// Result page location, empty when absent
        href: String,
        /// Error text from the site, empty when absent
        error: String,
    },
    /// The CAPTCHA answer was wrong
    CaptchaRejected,
    /// Any other bare numeric body
    ServerCode(i64),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmitResponse {
    #[serde(deserialize_with = "deserialize_boolish")]
    success: bool,
    #[serde(deserialize_with = "deserialize_text")]
    href: String,
    #[serde(deserialize_with = "deserialize_text")]
    error: String,
}

/// Decode a raw submit response body.
///
/// Leading and trailing whitespace and a UTF-8 byte-order mark are ignored.
pub fn decode_submit_response(body: &[u8]) -> Result<SubmitOutcome> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    let cleaned = trimmed.strip_prefix(UTF8_BOM).unwrap_or(trimmed).trim();

    if let Ok(code) = cleaned.parse::<i64>() {
        return Ok(if code == CAPTCHA_REJECTED_CODE {
            SubmitOutcome::CaptchaRejected
        } else {
            SubmitOutcome::ServerCode(code)
        });
    }

    let response: SubmitResponse = serde_json::from_str(cleaned)
        .map_err(|e| LookupError::Parse(format!("error parsing JSON response: {e}")))?;

    Ok(SubmitOutcome::Accepted {
        success: response.success,
        href: response.href,
        error: response.error,
    })
}

/// Accept the loose truthiness the site uses for `success`.
///
/// Booleans pass through, numbers are true when non-zero, `null` is false
/// and strings are true for `true`, `1`, `yes` or `y` in any case.
fn deserialize_boolish<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolishVisitor;

    impl<'de> Visitor<'de> for BoolishVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean, number or string flag")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<bool, E> {
            if v.fract() == 0.0 {
                Ok(v != 0.0)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<bool, E> {
            Ok(matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "y"
            ))
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<bool, E> {
            Ok(false)
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<bool, E> {
            Ok(false)
        }
    }

    deserializer.deserialize_any(BoolishVisitor)
}

/// A string field that may be `null`.
fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
