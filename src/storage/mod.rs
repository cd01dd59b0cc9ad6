//! Pluggable storage backends for archived HTML and screenshots.
//!
//! The crate ships with two built-in backends:
//!
//! - [`FsStorage`] -- writes to the local filesystem.
//! - [`S3Storage`] -- writes to an Amazon S3 (or compatible) bucket
//!   (requires the `s3` feature).
//!
//! [`AnyStorage`] picks one of them at startup. Implement the [`Storage`]
//! trait to add your own backend.

mod fs;
#[cfg(feature = "s3")]
mod s3;

pub use fs::FsStorage;
#[cfg(feature = "s3")]
pub use s3::{S3Settings, S3Storage};

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// How a retrieved object should be presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Display in the browser.
    Inline,
    /// Download as a file.
    Attachment,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// Trait for storage backends that can persist and return archived objects.
///
/// Implementations must be `Send + Sync + 'static` so a single instance can
/// be shared by the archive worker and the HTTP layer.
///
/// # Implementing a custom backend
///
/// ```rust,no_run
/// use bytes::Bytes;
/// use site_forge::{Disposition, Result, SiteForgeError, Storage};
///
/// struct MyStorage;
///
/// impl Storage for MyStorage {
///     async fn upload(
///         &self,
///         key: &str,
///         _content: Bytes,
///         _content_type: &str,
///         _disposition: Option<Disposition>,
///     ) -> Result<String> {
///         Ok(format!("mem://{key}"))
///     }
///
///     async fn download(&self, key: &str) -> Result<Bytes> {
///         Err(SiteForgeError::NotFound(key.to_string()))
///     }
///
///     fn object_url(&self, key: &str, _disposition: Disposition) -> String {
///         format!("mem://{key}")
///     }
/// }
/// ```
pub trait Storage: Send + Sync + 'static {
    /// Establish the backend's connection. Backends without a network
    /// lifecycle keep the default no-op.
    fn connect(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Release the backend's connection.
    fn disconnect(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Persist `content` under `key` and return the location it was stored at.
    fn upload(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
        disposition: Option<Disposition>,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Fetch the bytes stored under `key`.
    ///
    /// Fails with [`SiteForgeError::NotFound`](crate::SiteForgeError::NotFound)
    /// when nothing is stored there.
    fn download(&self, key: &str) -> impl Future<Output = Result<Bytes>> + Send;

    /// URL a client can use to retrieve `key` with the given disposition.
    fn object_url(&self, key: &str, disposition: Disposition) -> String;
}

/// Storage backend chosen at startup from configuration.
pub enum AnyStorage {
    Fs(FsStorage),
    #[cfg(feature = "s3")]
    S3(S3Storage),
}

impl Storage for AnyStorage {
    async fn connect(&self) -> Result<()> {
        match self {
            Self::Fs(s) => s.connect().await,
            #[cfg(feature = "s3")]
            Self::S3(s) => s.connect().await,
        }
    }

    async fn disconnect(&self) {
        match self {
            Self::Fs(s) => s.disconnect().await,
            #[cfg(feature = "s3")]
            Self::S3(s) => s.disconnect().await,
        }
    }

    async fn upload(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
        disposition: Option<Disposition>,
    ) -> Result<String> {
        match self {
            Self::Fs(s) => s.upload(key, content, content_type, disposition).await,
            #[cfg(feature = "s3")]
            Self::S3(s) => s.upload(key, content, content_type, disposition).await,
        }
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        match self {
            Self::Fs(s) => s.download(key).await,
            #[cfg(feature = "s3")]
            Self::S3(s) => s.download(key).await,
        }
    }

    fn object_url(&self, key: &str, disposition: Disposition) -> String {
        match self {
            Self::Fs(s) => s.object_url(key, disposition),
            #[cfg(feature = "s3")]
            Self::S3(s) => s.object_url(key, disposition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_strings() {
        assert_eq!(Disposition::Inline.as_str(), "inline");
        assert_eq!(Disposition::Attachment.as_str(), "attachment");
    }

    #[tokio::test]
    async fn any_storage_delegates_to_fs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = AnyStorage::Fs(FsStorage::new(tmp.path()));

        storage.connect().await.unwrap();
        storage
            .upload("7.html", Bytes::from_static(b"<p>7</p>"), "text/html", None)
            .await
            .unwrap();
        let read = storage.download("7.html").await.unwrap();
        assert_eq!(&read[..], b"<p>7</p>");
        assert_eq!(
            storage.object_url("7.html", Disposition::Inline),
            "/media/7.html"
        );
        storage.disconnect().await;
    }
}
