//! HTML-to-image rendering.
//!
//! [`Renderer`] is the capability the archive phase depends on;
//! [`GotenbergRenderer`] implements it against a Gotenberg Chromium service.

mod gotenberg;

pub use gotenberg::{GotenbergRenderer, RenderSettings, RenderSettingsBuilder};

use std::fmt;
use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// Raster formats a screenshot can be produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ScreenshotFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ScreenshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for services that turn an HTML document into an image.
///
/// Failures are reported as
/// [`SiteForgeError::RenderServer`](crate::SiteForgeError::RenderServer) when
/// the backend answered with an error, and as
/// [`SiteForgeError::RenderTransport`](crate::SiteForgeError::RenderTransport)
/// or [`SiteForgeError::Timeout`](crate::SiteForgeError::Timeout) when it
/// could not be reached in time.
pub trait Renderer: Send + Sync + 'static {
    /// Render `html` and return the encoded image.
    fn render(&self, html: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Format of the images returned by [`render`](Self::render).
    fn format(&self) -> ScreenshotFormat;
}
