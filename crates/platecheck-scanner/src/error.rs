use platecheck_captcha::CaptchaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CAPTCHA rejected by the site")]
    CaptchaRejected,

    #[error("captcha validation failed after {attempts} attempts")]
    ValidationExhausted { attempts: u32 },

    #[error("error solving captcha: {0}")]
    Captcha(#[from] CaptchaError),

    #[error("server returned error code: {code}")]
    ServerCode { code: i64 },

    #[error("error parsing response: {0}")]
    Parse(String),

    #[error("failed after {attempts} attempts: {last}")]
    ResultFetchExhausted {
        attempts: u32,
        last: Box<LookupError>,
    },

    #[error("invalid site URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

impl LookupError {
    /// Whether retrying the same request may succeed.
    ///
    /// Only network and I/O failures qualify. Parse errors are deterministic and a
    /// CAPTCHA rejection needs a new session rather than a repeat.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;
