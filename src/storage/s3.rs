//! Amazon S3 storage backend (requires the `s3` feature).

use std::fmt;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, Config as S3Config};
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use reqwest::Url;
use tokio::sync::{RwLock, Semaphore};

use crate::error::{Result, SiteForgeError};
use crate::storage::{Disposition, Storage};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection settings for [`S3Storage`].
///
/// Without an explicit access key and secret, credentials and region are
/// resolved from the AWS environment (env vars, config files, IMDS, etc.).
#[derive(Clone)]
pub struct S3Settings {
    endpoint_url: Url,
    bucket: String,
    region: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_pool_connections: usize,
}

impl S3Settings {
    /// Settings for `bucket` behind `endpoint_url`, with 10 s connect
    /// timeout, 20 s read timeout and at most 10 concurrent connections.
    pub fn new(endpoint_url: &str, bucket: impl Into<String>) -> Result<Self> {
        let endpoint_url = Url::parse(endpoint_url)
            .map_err(|e| SiteForgeError::Config(format!("invalid S3 endpoint url: {e}")))?;
        if endpoint_url.cannot_be_a_base() {
            return Err(SiteForgeError::Config(format!(
                "S3 endpoint url {endpoint_url} cannot hold a path"
            )));
        }
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(SiteForgeError::Config("S3 bucket name is empty".into()));
        }
        Ok(Self {
            endpoint_url,
            bucket,
            region: None,
            access_key: None,
            secret_key: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(20),
            max_pool_connections: 10,
        })
    }

    pub fn credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Must be at least 1.
    pub fn max_pool_connections(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SiteForgeError::Config(
                "S3 max pool connections must be at least 1".into(),
            ));
        }
        self.max_pool_connections = size;
        Ok(self)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint_url", &self.endpoint_url.as_str())
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_pool_connections", &self.max_pool_connections)
            .finish()
    }
}

/// Storage backend that uploads files to an Amazon S3 (or S3-compatible)
/// bucket.
///
/// The client is created by [`Storage::connect`] and dropped by
/// [`Storage::disconnect`]; calls made outside that window fail with
/// [`SiteForgeError::NotConnected`]. At most `max_pool_connections` calls
/// are in flight at once.
///
/// # Example
///
/// ```rust,ignore
/// use site_forge::{S3Settings, S3Storage, Storage};
///
/// let settings = S3Settings::new("http://localhost:9000", "sites")?
///     .credentials("minioadmin", "minioadmin");
/// let storage = S3Storage::new(settings);
/// storage.connect().await?;
/// ```
pub struct S3Storage {
    settings: S3Settings,
    client: RwLock<Option<Client>>,
    permits: Semaphore,
}

impl S3Storage {
    /// Create a disconnected `S3Storage`.
    pub fn new(settings: S3Settings) -> Self {
        let permits = Semaphore::new(settings.max_pool_connections);
        Self {
            settings,
            client: RwLock::new(None),
            permits,
        }
    }

    async fn client(&self) -> Result<Client> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(SiteForgeError::NotConnected("S3 storage"))
    }

    fn location(&self, key: &str) -> Url {
        let mut url = self.settings.endpoint_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.settings.bucket)
                .extend(key.split('/'));
        }
        url
    }
}

impl Storage for S3Storage {
    async fn connect(&self) -> Result<()> {
        let settings = &self.settings;
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build();

        let mut builder = match (&settings.access_key, &settings.secret_key) {
            (Some(key), Some(secret)) => S3Config::builder()
                .credentials_provider(Credentials::new(key, secret, None, None, "site-forge"))
                .region(Region::new("us-east-1")),
            _ => {
                let env = aws_config::defaults(BehaviorVersion::latest()).load().await;
                S3ConfigBuilder::from(&env)
            }
        };
        if let Some(region) = &settings.region {
            builder = builder.region(Region::new(region.clone()));
        }

        let config = builder
            .endpoint_url(settings.endpoint_url.as_str().trim_end_matches('/'))
            .force_path_style(true)
            .timeout_config(timeouts)
            .build();

        *self.client.write().await = Some(Client::from_conf(config));
        tracing::info!(
            "Connected to s3 bucket {} at {}",
            settings.bucket,
            settings.endpoint_url
        );
        Ok(())
    }

    async fn disconnect(&self) {
        if self.client.write().await.take().is_some() {
            tracing::info!("Disconnected from s3 bucket {}", self.settings.bucket);
        }
    }

    async fn upload(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
        disposition: Option<Disposition>,
    ) -> Result<String> {
        let client = self.client().await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SiteForgeError::StorageUpload(Box::new(e)))?;

        let len = content.len();
        client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .body(ByteStream::from(content))
            .content_type(content_type)
            .set_content_disposition(disposition.map(|d| d.as_str().to_string()))
            .send()
            .await
            .map_err(|e| classify(e, key, SiteForgeError::StorageUpload))?;

        tracing::debug!(
            "Uploaded {} bytes to s3://{}/{}",
            len,
            self.settings.bucket,
            key
        );
        Ok(self.location(key).to_string())
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let client = self.client().await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SiteForgeError::StorageDownload(Box::new(e)))?;

        let output = client
            .get_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e.as_service_error().is_some_and(|se| se.is_no_such_key())
                    || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if missing {
                    SiteForgeError::NotFound(key.to_string())
                } else {
                    classify(e, key, SiteForgeError::StorageDownload)
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| body_error(e, key))?;
        Ok(body.into_bytes())
    }

    fn object_url(&self, key: &str, disposition: Disposition) -> String {
        let mut url = self.location(key);
        url.query_pairs_mut()
            .append_pair("response-content-disposition", disposition.as_str());
        url.to_string()
    }
}

/// Separate timeouts from every other SDK failure.
fn classify<E, R>(
    err: SdkError<E, R>,
    key: &str,
    wrap: fn(BoxError) -> SiteForgeError,
) -> SiteForgeError
where
    E: std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let timed_out = match &err {
        SdkError::TimeoutError(_) => true,
        SdkError::DispatchFailure(failure) => failure.is_timeout(),
        _ => false,
    };
    if timed_out {
        SiteForgeError::Timeout(format!("s3 request for {key}"))
    } else {
        wrap(Box::new(err))
    }
}

/// A failure while reading an object body, with read timeouts kept apart.
fn body_error<E>(err: E, key: &str) -> SiteForgeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        let timed_out = e
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
            || e.to_string().to_ascii_lowercase().contains("timed out");
        if timed_out {
            return SiteForgeError::Timeout(format!("s3 body read for {key}"));
        }
        source = e.source();
    }
    SiteForgeError::StorageDownload(Box::new(err))
}
