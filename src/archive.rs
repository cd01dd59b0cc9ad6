//! The archival phase: HTML first, then a best-effort screenshot.

use std::sync::Arc;

use bytes::Bytes;

use crate::render::{Renderer, ScreenshotFormat};
use crate::storage::{Disposition, Storage};

/// Derives the object keys a target's artifacts are archived under.
///
/// HTML lives at `{id}.html` and the screenshot at `{id}.{ext}`, where `ext`
/// follows the screenshot format. A non-empty prefix is prepended with `/`.
///
/// ```
/// use site_forge::{ArchiveKeys, ScreenshotFormat};
///
/// let keys = ArchiveKeys::new("sites", ScreenshotFormat::Png);
/// assert_eq!(keys.html(42), "sites/42.html");
/// assert_eq!(keys.screenshot(42), "sites/42.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveKeys {
    prefix: String,
    format: ScreenshotFormat,
}

impl ArchiveKeys {
    pub fn new(prefix: impl Into<String>, format: ScreenshotFormat) -> Self {
        Self {
            prefix: prefix.into().trim_matches('/').to_string(),
            format,
        }
    }

    pub fn html(&self, target_id: u64) -> String {
        self.key(format!("{target_id}.html"))
    }

    pub fn screenshot(&self, target_id: u64) -> String {
        self.key(format!("{target_id}.{}", self.format.as_str()))
    }

    pub fn screenshot_format(&self) -> ScreenshotFormat {
        self.format
    }

    fn key(&self, name: String) -> String {
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

/// Sealed content of one finished generation, ready to archive.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub target_id: u64,
    pub content: Bytes,
}

/// What the archival phase achieved for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveReport {
    /// The HTML upload failed; nothing else was attempted.
    HtmlFailed,
    /// HTML archived, the renderer failed.
    RenderFailed { html_url: String },
    /// HTML archived and rendered, the screenshot upload failed.
    ScreenshotFailed { html_url: String },
    /// Both artifacts archived.
    Complete {
        html_url: String,
        screenshot_url: String,
    },
}

/// Runs the archival phase against shared storage and renderer instances.
pub struct Archiver<S, R> {
    storage: Arc<S>,
    renderer: Arc<R>,
    keys: ArchiveKeys,
}

impl<S: Storage, R: Renderer> Archiver<S, R> {
    pub fn new(storage: Arc<S>, renderer: Arc<R>, keys: ArchiveKeys) -> Self {
        Self {
            storage,
            renderer,
            keys,
        }
    }

    /// Archive one job. Never fails: every error is logged and reflected in
    /// the returned report.
    pub async fn archive(&self, job: ArchiveJob) -> ArchiveReport {
        let ArchiveJob { target_id, content } = job;

        let html_key = self.keys.html(target_id);
        let html_url = match self
            .storage
            .upload(
                &html_key,
                content.clone(),
                "text/html",
                Some(Disposition::Inline),
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(target_id, "Failed to archive {html_key}: {e}");
                return ArchiveReport::HtmlFailed;
            }
        };
        tracing::info!(target_id, bytes = content.len(), "Archived {html_key}");

        let image = match self.renderer.render(content).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(target_id, "Screenshot skipped, renderer failed: {e}");
                return ArchiveReport::RenderFailed { html_url };
            }
        };

        let format = self.renderer.format();
        let screenshot_key = self.keys.screenshot(target_id);
        match self
            .storage
            .upload(&screenshot_key, image, format.content_type(), None)
            .await
        {
            Ok(screenshot_url) => {
                tracing::info!(target_id, "Archived {screenshot_key}");
                ArchiveReport::Complete {
                    html_url,
                    screenshot_url,
                }
            }
            Err(e) => {
                tracing::error!(target_id, "Failed to archive {screenshot_key}: {e}");
                ArchiveReport::ScreenshotFailed { html_url }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_without_prefix() {
        let keys = ArchiveKeys::new("", ScreenshotFormat::Png);
        assert_eq!(keys.html(42), "42.html");
        assert_eq!(keys.screenshot(42), "42.png");
    }

    #[test]
    fn keys_follow_format_and_trim_prefix() {
        let keys = ArchiveKeys::new("/snapshots/v1/", ScreenshotFormat::Webp);
        assert_eq!(keys.html(7), "snapshots/v1/7.html");
        assert_eq!(keys.screenshot(7), "snapshots/v1/7.webp");
        assert_eq!(keys.screenshot_format(), ScreenshotFormat::Webp);
    }
}
