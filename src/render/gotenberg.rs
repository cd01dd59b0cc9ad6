//! Gotenberg screenshot client.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use tokio::sync::Semaphore;

use crate::error::{Result, SiteForgeError};
use crate::render::{Renderer, ScreenshotFormat};

const SCREENSHOT_ROUTE: &str = "forms/chromium/screenshot/html";

/// Validated settings for [`GotenbergRenderer`].
///
/// The only way to obtain one is [`RenderSettings::builder`] followed by
/// [`RenderSettingsBuilder::build`], which refuses a wait delay that is not
/// strictly shorter than the request timeout.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    url: Url,
    width: u32,
    format: ScreenshotFormat,
    wait_delay: Duration,
    timeout: Duration,
    max_connections: usize,
}

impl RenderSettings {
    /// Start building settings for the Gotenberg instance at `url`.
    ///
    /// Defaults: width 600, PNG, wait delay 8 s, timeout 10 s, 5 connections.
    pub fn builder(url: impl Into<String>) -> RenderSettingsBuilder {
        RenderSettingsBuilder {
            url: url.into(),
            width: 600,
            format: ScreenshotFormat::Png,
            wait_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(10),
            max_connections: 5,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn format(&self) -> ScreenshotFormat {
        self.format
    }

    pub fn wait_delay(&self) -> Duration {
        self.wait_delay
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Builder for [`RenderSettings`].
#[derive(Debug, Clone)]
pub struct RenderSettingsBuilder {
    url: String,
    width: u32,
    format: ScreenshotFormat,
    wait_delay: Duration,
    timeout: Duration,
    max_connections: usize,
}

impl RenderSettingsBuilder {
    /// Viewport width of the screenshot in pixels.
    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn format(mut self, format: ScreenshotFormat) -> Self {
        self.format = format;
        self
    }

    /// Time the page is given to settle before capture.
    pub fn wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Upper bound for a whole render round trip.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of renders in flight at once.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn build(self) -> Result<RenderSettings> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| SiteForgeError::Config(format!("invalid renderer url: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(SiteForgeError::Config(format!(
                "renderer url {url} cannot hold a path"
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        if self.width == 0 {
            return Err(SiteForgeError::Config(
                "screenshot width must be at least 1".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(SiteForgeError::Config(
                "renderer max connections must be at least 1".into(),
            ));
        }
        if self.wait_delay >= self.timeout {
            return Err(SiteForgeError::Config(format!(
                "renderer wait delay ({:?}) must be strictly less than timeout ({:?})",
                self.wait_delay, self.timeout
            )));
        }

        Ok(RenderSettings {
            url,
            width: self.width,
            format: self.format,
            wait_delay: self.wait_delay,
            timeout: self.timeout,
            max_connections: self.max_connections,
        })
    }
}

/// [`Renderer`] backed by Gotenberg's Chromium screenshot route.
///
/// Owns a pooled HTTP client for a single Gotenberg endpoint; at most
/// `max_connections` renders run at once and each is bounded by the configured
/// timeout. Dropping the renderer releases its connections.
///
/// # Example
///
/// ```rust,no_run
/// use site_forge::{GotenbergRenderer, RenderSettings};
/// use std::time::Duration;
///
/// # fn example() -> site_forge::Result<()> {
/// let settings = RenderSettings::builder("http://localhost:3000")
///     .width(1000)
///     .wait_delay(Duration::from_secs(5))
///     .timeout(Duration::from_secs(15))
///     .build()?;
/// let renderer = GotenbergRenderer::connect(settings)?;
/// # Ok(())
/// # }
/// ```
pub struct GotenbergRenderer {
    client: reqwest::Client,
    endpoint: Url,
    settings: RenderSettings,
    permits: Semaphore,
}

impl GotenbergRenderer {
    /// Build the HTTP client for the configured endpoint.
    pub fn connect(settings: RenderSettings) -> Result<Self> {
        let endpoint = settings
            .url
            .join(SCREENSHOT_ROUTE)
            .map_err(|e| SiteForgeError::Config(format!("invalid renderer url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.max_connections)
            .build()
            .map_err(|e| SiteForgeError::Config(format!("renderer client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            permits: Semaphore::new(settings.max_connections),
            settings,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    fn form(&self, html: Bytes) -> Result<Form> {
        let index = Part::bytes(html.to_vec())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| SiteForgeError::RenderTransport(Box::new(e)))?;

        Ok(Form::new()
            .part("files", index)
            .text("width", self.settings.width.to_string())
            .text("format", self.settings.format.as_str())
            .text(
                "waitDelay",
                format!("{}ms", self.settings.wait_delay.as_millis()),
            ))
    }
}

impl Renderer for GotenbergRenderer {
    async fn render(&self, html: Bytes) -> Result<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SiteForgeError::RenderTransport(Box::new(e)))?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(self.form(html)?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(SiteForgeError::RenderServer {
                status: status.as_u16(),
                body,
            });
        }

        let image = response.bytes().await.map_err(transport_error)?;
        tracing::debug!("Rendered {} bytes of {}", image.len(), self.settings.format);
        Ok(image)
    }

    fn format(&self) -> ScreenshotFormat {
        self.settings.format
    }
}

fn transport_error(e: reqwest::Error) -> SiteForgeError {
    if e.is_timeout() {
        SiteForgeError::Timeout(format!("renderer request: {e}"))
    } else {
        SiteForgeError::RenderTransport(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_delay_must_be_below_timeout() {
        let err = RenderSettings::builder("http://localhost:3000")
            .wait_delay(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));

        let err = RenderSettings::builder("http://localhost:3000")
            .wait_delay(Duration::from_secs(12))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));
    }

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::builder("http://localhost:3000")
            .build()
            .unwrap();
        assert_eq!(settings.width(), 600);
        assert_eq!(settings.format(), ScreenshotFormat::Png);
        assert_eq!(settings.wait_delay(), Duration::from_secs(8));
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_connections(), 5);
    }

    #[test]
    fn rejects_zero_width_and_pool() {
        assert!(
            RenderSettings::builder("http://localhost:3000")
                .width(0)
                .build()
                .is_err()
        );
        assert!(
            RenderSettings::builder("http://localhost:3000")
                .max_connections(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let settings = RenderSettings::builder("http://render.internal/gotenberg")
            .build()
            .unwrap();
        let renderer = GotenbergRenderer::connect(settings).unwrap();
        assert_eq!(
            renderer.endpoint.as_str(),
            "http://render.internal/gotenberg/forms/chromium/screenshot/html"
        );
    }
}
