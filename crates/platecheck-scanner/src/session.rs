//! Per-attempt browsing sessions against the lookup site.
//!
//! Every CAPTCHA attempt opens a new session so that the image, the answer
//! and the form submission share one cookie jar, and a rejected session is
//! never reused.

use crate::error::{LookupError, Result};
use async_trait::async_trait;
use platecheck_captcha::{CaptchaError, CaptchaImageSource};
use platecheck_core::{CaptchaAnswer, SiteConfig};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fields of one lookup form submission.
#[derive(Debug, Clone, Copy)]
pub struct LookupForm<'a> {
    /// Plate as entered by the user
    pub license_plate: &'a str,
    /// Site vehicle type code
    pub vehicle_type: &'a str,
    /// Answer for the CAPTCHA fetched in the same session
    pub captcha: &'a CaptchaAnswer,
}

/// One isolated browsing session.
#[async_trait]
pub trait SiteSession: CaptchaImageSource {
    /// This session as the solver's image source.
    fn as_image_source(&self) -> &dyn CaptchaImageSource;

    /// Post the lookup form and return the raw response body.
    async fn submit_lookup(&self, form: &LookupForm<'_>) -> Result<Vec<u8>>;

    /// Download the result page at `href`, relative to the site root or absolute.
    async fn fetch_result_page(&self, href: &str) -> Result<String>;
}

/// Opens fresh sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session with an empty cookie jar.
    async fn open(&self) -> Result<Box<dyn SiteSession>>;
}

/// Resolved site URLs and request identity.
#[derive(Debug, Clone)]
pub struct SiteEndpoints {
    base: Url,
    captcha: Url,
    submit: Url,
    form: Url,
    origin: String,
    client_ip: String,
    user_agent: String,
    timeout: Duration,
}

impl SiteEndpoints {
    /// Resolve all site paths against the configured base URL.
    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        Ok(Self {
            captcha: base.join(&config.captcha_path)?,
            submit: base.join(&config.submit_path)?,
            form: base.join(&config.form_path)?,
            origin: base.origin().ascii_serialization(),
            client_ip: config.client_ip.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            base,
        })
    }

    /// CAPTCHA image URL.
    #[must_use]
    pub fn captcha_url(&self) -> &Url {
        &self.captcha
    }

    /// Form submission URL.
    #[must_use]
    pub fn submit_url(&self) -> &Url {
        &self.submit
    }

    /// Public form page, sent as `Referer` and `cUrl`.
    #[must_use]
    pub fn form_url(&self) -> &Url {
        &self.form
    }

    /// Value of the `Origin` header.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolve a result page link.
    pub fn resolve(&self, href: &str) -> Result<Url> {
        Ok(self.base.join(href)?)
    }

    fn form_body(&self, form: &LookupForm<'_>) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("BienKS", form.license_plate)
            .append_pair("Xe", form.vehicle_type)
            .append_pair("captcha", form.captcha.as_str())
            .append_pair("ipClient", &self.client_ip)
            .append_pair("cUrl", self.form.as_str())
            .finish()
    }
}

/// Opens [`HttpSiteSession`]s.
pub struct HttpSessionFactory {
    endpoints: Arc<SiteEndpoints>,
}

impl HttpSessionFactory {
    /// Create a factory for the configured site.
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(Self {
            endpoints: Arc::new(SiteEndpoints::from_config(config)?),
        })
    }

    /// Resolved endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &SiteEndpoints {
        &self.endpoints
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self) -> Result<Box<dyn SiteSession>> {
        Ok(Box::new(HttpSiteSession::new(Arc::clone(&self.endpoints))?))
    }
}

/// Session backed by its own `reqwest` client and cookie store.
pub struct HttpSiteSession {
    client: Client,
    endpoints: Arc<SiteEndpoints>,
}

impl HttpSiteSession {
    /// Create a session with an empty cookie jar.
    pub fn new(endpoints: Arc<SiteEndpoints>) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(endpoints.timeout)
            .build()
            .map_err(|e| LookupError::Client(e.to_string()))?;

        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl CaptchaImageSource for HttpSiteSession {
    async fn captcha_image(&self) -> platecheck_captcha::Result<Vec<u8>> {
        let response = self
            .client
            .get(self.endpoints.captcha.clone())
            .header("User-Agent", &self.endpoints.user_agent)
            .header("Referer", self.endpoints.form.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Download {
                message: format!("CAPTCHA endpoint returned {status}"),
            });
        }

        let bytes = response.bytes().await?;
        tracing::trace!(size = bytes.len(), "downloaded CAPTCHA image");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SiteSession for HttpSiteSession {
    fn as_image_source(&self) -> &dyn CaptchaImageSource {
        self
    }

    async fn submit_lookup(&self, form: &LookupForm<'_>) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoints.submit.clone())
            .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .header("User-Agent", &self.endpoints.user_agent)
            .header("Referer", self.endpoints.form.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Origin", &self.endpoints.origin)
            .body(self.endpoints.form_body(form))
            .send()
            .await?;

        tracing::debug!(status = %response.status(), "form submitted");
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_result_page(&self, href: &str) -> Result<String> {
        let url = self.endpoints.resolve(href)?;
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.endpoints.user_agent)
            .header("Referer", self.endpoints.form.as_str())
            .send()
            .await?;

        tracing::debug!(status = %response.status(), "result page fetched");
        let bytes = response.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> SiteEndpoints {
        SiteEndpoints::from_config(&SiteConfig::default()).expect("default site config")
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = endpoints();

        assert_eq!(
            endpoints.captcha_url().as_str(),
            "https://www.csgt.vn/lib/captcha/captcha.class.php"
        );
        assert_eq!(
            endpoints.submit_url().as_str(),
            "https://www.csgt.vn/?mod=contact&task=tracuu_post&ajax"
        );
        assert_eq!(
            endpoints.form_url().as_str(),
            "https://www.csgt.vn/tra-cuu-phuong-tien-vi-pham.html"
        );
        assert_eq!(endpoints.origin(), "https://www.csgt.vn");
    }

    #[test]
    fn test_resolve_href() {
        let endpoints = endpoints();

        assert_eq!(
            endpoints.resolve("/tra-cuu?id=1").expect("relative").as_str(),
            "https://www.csgt.vn/tra-cuu?id=1"
        );
        assert_eq!(
            endpoints
                .resolve("https://other.example/page")
                .expect("absolute")
                .as_str(),
            "https://other.example/page"
        );
    }

    #[test]
    fn test_form_body() {
        let endpoints = endpoints();
        let captcha = CaptchaAnswer::new("ab12C").expect("valid answer");
        let form = LookupForm {
            license_plate: "30A-123.45",
            vehicle_type: "1",
            captcha: &captcha,
        };

        assert_eq!(
            endpoints.form_body(&form),
            "BienKS=30A-123.45&Xe=1&captcha=ab12C&ipClient=9.9.9.91\
             &cUrl=https%3A%2F%2Fwww.csgt.vn%2Ftra-cuu-phuong-tien-vi-pham.html"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = SiteConfig {
            base_url: "not a url".to_string(),
            ..SiteConfig::default()
        };
        assert!(matches!(
            SiteEndpoints::from_config(&config),
            Err(LookupError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_opens_sessions() {
        let factory = HttpSessionFactory::new(&SiteConfig::default()).expect("factory");
        assert!(factory.open().await.is_ok());
        assert_eq!(factory.endpoints().origin(), "https://www.csgt.vn");
    }
}
