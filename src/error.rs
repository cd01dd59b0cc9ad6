//! Error types for the `site_forge` crate.

/// All errors that can occur while generating, streaming and archiving a site.
#[derive(Debug, thiserror::Error)]
pub enum SiteForgeError {
    /// The generation request was rejected before anything started.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The content generator failed to start or failed mid-stream.
    #[error("Generation failed: {0}")]
    Generation(Box<dyn std::error::Error + Send + Sync>),

    /// A storage backend was used before its connection was established.
    #[error("{0} is not connected")]
    NotConnected(&'static str),

    /// The requested object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object key is not acceptable for the backend.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// An upstream call exceeded its configured timeout.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A storage backend failed to persist content.
    #[error("Storage upload failed: {0}")]
    StorageUpload(Box<dyn std::error::Error + Send + Sync>),

    /// A storage backend failed to return content.
    #[error("Storage download failed: {0}")]
    StorageDownload(Box<dyn std::error::Error + Send + Sync>),

    /// The rendering backend answered with a failure status.
    #[error("Renderer returned {status}: {body}")]
    RenderServer { status: u16, body: String },

    /// The rendering backend could not be reached.
    #[error("Renderer transport error: {0}")]
    RenderTransport(Box<dyn std::error::Error + Send + Sync>),

    /// The pipeline no longer accepts new generations.
    #[error("Pipeline is shutting down")]
    ShuttingDown,

    /// The configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),
}

/// A type alias for `Result<T, SiteForgeError>`.
pub type Result<T> = std::result::Result<T, SiteForgeError>;
