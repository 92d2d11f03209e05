//! Configuration management for the lookup service.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use url::Url;

/// Environment variable naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "PLATECHECK_CONFIG";

/// Main application configuration.
///
/// This is loaded from `$PLATECHECK_CONFIG` or `~/.config/platecheck/config.toml`
/// (or platform equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Target site endpoints and browser mimicry
    pub site: SiteConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Retry budgets for a single lookup
    pub lookup: LookupConfig,
    /// Token bucket settings
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `OCR_API_KEY`: API key for the cloud OCR fallback
    /// - `PORT`: Listening port
    /// - `PLATECHECK_MAX_ATTEMPTS`: Override the CAPTCHA attempt budget
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup function.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OCR_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.ocr.api_key = Some(key.trim().to_string());
            tracing::debug!("Override ocr.api_key from env");
        }

        if let Some(val) = var("PORT") {
            match val.parse() {
                Ok(port) => {
                    self.server.port = port;
                    tracing::debug!("Override server.port from env: {}", port);
                }
                Err(_) => tracing::warn!("Ignoring unparseable PORT value: {}", val),
            }
        }

        if let Some(val) = var("PLATECHECK_MAX_ATTEMPTS") {
            match val.parse() {
                Ok(attempts) => {
                    self.lookup.max_captcha_attempts = attempts;
                    tracing::debug!("Override lookup.max_captcha_attempts from env: {}", attempts);
                }
                Err(_) => tracing::warn!("Ignoring unparseable PLATECHECK_MAX_ATTEMPTS value: {}", val),
            }
        }
    }

    /// Check values that would make the service unusable.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        Url::parse(&self.site.base_url)
            .map_err(|e| invalid("site.base_url", &format!("not a valid URL: {e}")))?;

        if self.lookup.max_captcha_attempts == 0 {
            return Err(invalid("lookup.max_captcha_attempts", "must be at least 1"));
        }
        if self.lookup.result_fetch_attempts == 0 {
            return Err(invalid("lookup.result_fetch_attempts", "must be at least 1"));
        }
        if self.rate_limit.global_capacity == 0 {
            return Err(invalid("rate_limit.global_capacity", "must be at least 1"));
        }
        if self.rate_limit.client_capacity == 0 {
            return Err(invalid("rate_limit.client_capacity", "must be at least 1"));
        }
        if self.rate_limit.global_refill_ms == 0 || self.rate_limit.client_refill_ms == 0 {
            return Err(invalid("rate_limit", "refill intervals must be non-zero"));
        }
        if self.rate_limit.max_tracked_clients == 0 {
            return Err(invalid("rate_limit.max_tracked_clients", "must be at least 1"));
        }

        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Honors `PLATECHECK_CONFIG`, otherwise uses XDG base directories:
    /// `~/.config/platecheck/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let dirs =
            ProjectDirs::from("com", "platecheck", "platecheck").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Target site endpoints and the browser identity presented to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site root, other paths are resolved against it
    pub base_url: String,
    /// CAPTCHA image endpoint
    pub captcha_path: String,
    /// AJAX form submission endpoint
    pub submit_path: String,
    /// Public lookup form page, sent as referer
    pub form_path: String,
    /// Value of the `ipClient` form field
    pub client_ip: String,
    /// User agent string
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.csgt.vn/".to_string(),
            captcha_path: "lib/captcha/captcha.class.php".to_string(),
            submit_path: "?mod=contact&task=tracuu_post&ajax".to_string(),
            form_path: "tra-cuu-phuong-tien-vi-pham.html".to_string(),
            client_ip: "9.9.9.91".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36".to_string(),
            request_timeout_secs: 45,
        }
    }
}

/// OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// OCR.space API key (from env, never written back to disk)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// OCR.space endpoint
    pub api_url: String,
    /// Cloud request timeout in seconds
    pub timeout_secs: u64,
    /// Tesseract executable
    pub tesseract_path: String,
    /// Tesseract language
    pub language: String,
    /// Contrast boost applied before recognition, in percent
    pub contrast: f32,
    /// JPEG quality for the cloud upload
    pub jpeg_quality: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.ocr.space/parse/image".to_string(),
            timeout_secs: 20,
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            contrast: 20.0,
            jpeg_quality: 95,
        }
    }
}

/// Retry budgets for a single lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Attempts allowed while the site keeps rejecting the CAPTCHA
    pub max_captcha_attempts: u32,
    /// Treat a total OCR failure like a rejected CAPTCHA and try a new image
    pub retry_on_ocr_failure: bool,
    /// Attempts for downloading the result page
    pub result_fetch_attempts: u32,
    /// First backoff delay for the result page, doubled on each retry
    pub result_backoff_base_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_captcha_attempts: 9,
            retry_on_ocr_failure: false,
            result_fetch_attempts: 3,
            result_backoff_base_ms: 1000,
        }
    }
}

/// Token bucket settings, global and per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Global bucket size
    pub global_capacity: u32,
    /// Global refill interval per token in milliseconds
    pub global_refill_ms: u64,
    /// Per-client bucket size
    pub client_capacity: u32,
    /// Per-client refill interval per token in milliseconds
    pub client_refill_ms: u64,
    /// Idle time after which a client's bucket is evicted
    pub client_idle_ttl_secs: u64,
    /// How often idle client buckets are swept
    pub client_sweep_interval_secs: u64,
    /// Upper bound on tracked clients; least recently used are evicted first
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_capacity: 50,
            global_refill_ms: 20,
            client_capacity: 10,
            client_refill_ms: 100,
            client_idle_ttl_secs: 600,
            client_sweep_interval_secs: 60,
            max_tracked_clients: 10_000,
        }
    }
}
