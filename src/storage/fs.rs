//! Filesystem storage backend.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;

use crate::error::{Result, SiteForgeError};
use crate::storage::{Disposition, Storage};

/// Storage backend that writes files to the local filesystem.
///
/// Intermediate directories are created on first use. The `key` provided to
/// [`Storage::upload`] is joined with the base directory to form the final
/// path. Objects are retrieved through the application's media route, so
/// [`Storage::object_url`] returns a path under that route.
///
/// # Example
///
/// ```rust,no_run
/// use site_forge::FsStorage;
///
/// let storage = FsStorage::new("/var/data/sites").public_prefix("/files");
/// ```
pub struct FsStorage {
    base_dir: PathBuf,
    public_prefix: String,
}

impl FsStorage {
    /// Create a new `FsStorage` rooted at the given directory, served under
    /// `/media`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_prefix: "/media".to_string(),
        }
    }

    /// Route prefix used by [`Storage::object_url`].
    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(SiteForgeError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

impl Storage for FsStorage {
    async fn upload(
        &self,
        key: &str,
        content: Bytes,
        _content_type: &str,
        _disposition: Option<Disposition>,
    ) -> Result<String> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SiteForgeError::StorageUpload(Box::new(e)))?;
        }

        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| SiteForgeError::StorageUpload(Box::new(e)))?;

        tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(path.display().to_string())
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SiteForgeError::NotFound(key.to_string()))
            }
            Err(e) => Err(SiteForgeError::StorageDownload(Box::new(e))),
        }
    }

    fn object_url(&self, key: &str, disposition: Disposition) -> String {
        let url = format!("{}/{}", self.public_prefix, key);
        match disposition {
            Disposition::Inline => url,
            Disposition::Attachment => format!("{url}?download=true"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_escaping_base_dir() {
        let storage = FsStorage::new("/srv/sites");
        for key in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(storage.resolve(key), Err(SiteForgeError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_nested_keys() {
        let storage = FsStorage::new("/srv/sites");
        let path = storage.resolve("v1/42.html").unwrap();
        assert_eq!(path, PathBuf::from("/srv/sites/v1/42.html"));
    }

    #[test]
    fn object_url_uses_public_prefix() {
        let storage = FsStorage::new("/srv/sites").public_prefix("/files/");
        assert_eq!(
            storage.object_url("42.png", Disposition::Inline),
            "/files/42.png"
        );
        assert_eq!(
            storage.object_url("42.html", Disposition::Attachment),
            "/files/42.html?download=true"
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path());
        let err = storage.download("nope.html").await.unwrap_err();
        assert!(matches!(err, SiteForgeError::NotFound(key) if key == "nope.html"));
    }
}
