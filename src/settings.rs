//! Runtime configuration for the `site-forge` binary.
//!
//! Every value can be passed as a CLI flag or an environment variable (a
//! `.env` file is loaded first by the binary). Nested settings use `__` in
//! their variable names, e.g. `S3__BUCKET_NAME` or `GOTENBERG__WAIT_DELAY`.
//! [`AppConfig::try_from`] validates everything before the server binds.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

use crate::error::{Result, SiteForgeError};
use crate::generator::ChatSettings;
use crate::render::{RenderSettings, ScreenshotFormat};
#[cfg(feature = "s3")]
use crate::storage::{S3Settings, S3Storage};
use crate::storage::{AnyStorage, FsStorage};

/// Which storage backend archives are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    S3,
    Fs,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "site-forge",
    version,
    about = "Streams generated HTML sites to clients and archives them with a screenshot"
)]
pub struct CliArgs {
    /// Address the HTTP server listens on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8000"))]
    pub server_addr: String,

    /// Fragments buffered between a generation and its HTTP response.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Finished generations queued for archival.
    ///
    /// Environment variable: `ARCHIVE_QUEUE_SIZE`
    #[arg(long, env = "ARCHIVE_QUEUE_SIZE", default_value_t = 256)]
    pub archive_queue_size: usize,

    /// Finished generations archived at the same time.
    ///
    /// Environment variable: `ARCHIVE_CONCURRENCY`
    #[arg(long, env = "ARCHIVE_CONCURRENCY", default_value_t = 8)]
    pub archive_concurrency: usize,

    /// Prefix prepended to every archived object key.
    ///
    /// Environment variable: `STORAGE_KEY_PREFIX`
    #[arg(long, env = "STORAGE_KEY_PREFIX", default_value_t = String::new())]
    pub key_prefix: String,

    /// Storage backend for archived HTML and screenshots.
    ///
    /// Environment variable: `STORAGE_BACKEND`
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "s3")]
    pub storage_backend: StorageBackend,

    /// Base directory of the filesystem backend.
    ///
    /// Environment variable: `STORAGE_DIR`
    #[arg(long, env = "STORAGE_DIR", default_value = "media")]
    pub storage_dir: PathBuf,

    /// Emit logs as JSON lines instead of human-readable text.
    ///
    /// Environment variable: `LOG_JSON`
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    #[command(flatten)]
    pub s3: S3Args,

    #[command(flatten)]
    pub gotenberg: GotenbergArgs,

    #[command(flatten)]
    pub deepseek: GeneratorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct S3Args {
    /// S3 endpoint, e.g. `http://localhost:9000` for MinIO.
    #[arg(long = "s3-endpoint-url", env = "S3__ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    #[arg(long = "s3-bucket-name", env = "S3__BUCKET_NAME")]
    pub bucket_name: Option<String>,

    /// Falls back to the AWS credential chain when unset.
    #[arg(long = "s3-access-key", env = "S3__ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long = "s3-secret-key", env = "S3__SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long = "s3-region", env = "S3__REGION")]
    pub region: Option<String>,

    /// Seconds.
    #[arg(long = "s3-read-timeout", env = "S3__READ_TIMEOUT", default_value_t = 20)]
    pub read_timeout: u64,

    /// Seconds.
    #[arg(long = "s3-connect-timeout", env = "S3__CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    #[arg(
        long = "s3-max-pool-connections",
        env = "S3__MAX_POOL_CONNECTIONS",
        default_value_t = 10
    )]
    pub max_pool_connections: usize,
}

#[derive(Args, Debug, Clone)]
pub struct GotenbergArgs {
    /// Base URL of the Gotenberg service.
    #[arg(long = "gotenberg-url", env = "GOTENBERG__URL")]
    pub url: String,

    #[arg(
        long = "gotenberg-screenshot-width",
        env = "GOTENBERG__SCREENSHOT_WIDTH",
        default_value_t = 600
    )]
    pub screenshot_width: u32,

    #[arg(
        long = "gotenberg-screenshot-format",
        env = "GOTENBERG__SCREENSHOT_FORMAT",
        value_enum,
        default_value_t = ScreenshotFormat::Png
    )]
    pub screenshot_format: ScreenshotFormat,

    #[arg(
        id = "gotenberg_max_connections",
        long = "gotenberg-max-connections",
        env = "GOTENBERG__MAX_CONNECTIONS",
        default_value_t = 5
    )]
    pub max_connections: usize,

    /// Seconds.
    #[arg(id = "gotenberg_timeout", long = "gotenberg-timeout", env = "GOTENBERG__TIMEOUT", default_value_t = 10)]
    pub timeout: u64,

    /// Seconds the page is given to settle; must be below the timeout.
    #[arg(long = "gotenberg-wait-delay", env = "GOTENBERG__WAIT_DELAY", default_value_t = 8)]
    pub wait_delay: u64,
}

#[derive(Args, Debug, Clone)]
pub struct GeneratorArgs {
    #[arg(long = "deepseek-api-key", env = "DEEPSEEK__API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(
        long = "deepseek-base-url",
        env = "DEEPSEEK__BASE_URL",
        default_value = "https://api.deepseek.com/v1"
    )]
    pub base_url: String,

    #[arg(long = "deepseek-model", env = "DEEPSEEK__MODEL", default_value = "deepseek-chat")]
    pub model: String,

    /// Seconds.
    #[arg(id = "deepseek_timeout", long = "deepseek-timeout", env = "DEEPSEEK__TIMEOUT", default_value_t = 20)]
    pub timeout: u64,

    #[arg(id = "deepseek_max_connections", long = "deepseek-max-connections", env = "DEEPSEEK__MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    #[arg(long = "deepseek-system-prompt", env = "DEEPSEEK__SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,
}

/// Validated storage choice.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Fs(PathBuf),
    #[cfg(feature = "s3")]
    S3(S3Settings),
}

impl StorageConfig {
    /// Construct the (not yet connected) backend.
    pub fn open(self) -> AnyStorage {
        match self {
            Self::Fs(dir) => AnyStorage::Fs(FsStorage::new(dir)),
            #[cfg(feature = "s3")]
            Self::S3(settings) => AnyStorage::S3(S3Storage::new(settings)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_addr: String,
    pub stream_buffer_size: usize,
    pub archive_queue_size: usize,
    pub archive_concurrency: usize,
    pub key_prefix: String,
    pub log_json: bool,
    pub storage: StorageConfig,
    pub render: RenderSettings,
    pub generator: ChatSettings,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = SiteForgeError;

    fn try_from(args: CliArgs) -> Result<Self> {
        if args.stream_buffer_size == 0 {
            return Err(SiteForgeError::Config(
                "STREAM_BUFFER_SIZE must be greater than 0".into(),
            ));
        }
        if args.archive_queue_size == 0 {
            return Err(SiteForgeError::Config(
                "ARCHIVE_QUEUE_SIZE must be greater than 0".into(),
            ));
        }
        if args.archive_concurrency == 0 {
            return Err(SiteForgeError::Config(
                "ARCHIVE_CONCURRENCY must be greater than 0".into(),
            ));
        }

        let storage = storage_config(args.storage_backend, args.storage_dir, args.s3)?;

        let render = RenderSettings::builder(args.gotenberg.url)
            .width(args.gotenberg.screenshot_width)
            .format(args.gotenberg.screenshot_format)
            .max_connections(args.gotenberg.max_connections)
            .timeout(Duration::from_secs(args.gotenberg.timeout))
            .wait_delay(Duration::from_secs(args.gotenberg.wait_delay))
            .build()?;

        let mut generator = ChatSettings::new(args.deepseek.api_key)
            .base_url(args.deepseek.base_url)
            .model(args.deepseek.model)
            .timeout(Duration::from_secs(args.deepseek.timeout))
            .max_connections(args.deepseek.max_connections)?;
        if let Some(prompt) = args.deepseek.system_prompt {
            generator = generator.system_prompt(prompt);
        }

        Ok(Self {
            server_addr: args.server_addr,
            stream_buffer_size: args.stream_buffer_size,
            archive_queue_size: args.archive_queue_size,
            archive_concurrency: args.archive_concurrency,
            key_prefix: args.key_prefix,
            log_json: args.log_json,
            storage,
            render,
            generator,
        })
    }
}

#[cfg(feature = "s3")]
fn storage_config(backend: StorageBackend, dir: PathBuf, s3: S3Args) -> Result<StorageConfig> {
    match backend {
        StorageBackend::Fs => Ok(StorageConfig::Fs(dir)),
        StorageBackend::S3 => {
            let endpoint = s3.endpoint_url.ok_or_else(|| {
                SiteForgeError::Config("S3__ENDPOINT_URL is required for the s3 backend".into())
            })?;
            let bucket = s3.bucket_name.ok_or_else(|| {
                SiteForgeError::Config("S3__BUCKET_NAME is required for the s3 backend".into())
            })?;

            let mut settings = S3Settings::new(&endpoint, bucket)?
                .connect_timeout(Duration::from_secs(s3.connect_timeout))
                .read_timeout(Duration::from_secs(s3.read_timeout))
                .max_pool_connections(s3.max_pool_connections)?;
            match (s3.access_key, s3.secret_key) {
                (Some(key), Some(secret)) => settings = settings.credentials(key, secret),
                (None, None) => {}
                _ => {
                    return Err(SiteForgeError::Config(
                        "S3__ACCESS_KEY and S3__SECRET_KEY must be set together".into(),
                    ));
                }
            }
            if let Some(region) = s3.region {
                settings = settings.region(region);
            }
            Ok(StorageConfig::S3(settings))
        }
    }
}

#[cfg(not(feature = "s3"))]
fn storage_config(backend: StorageBackend, dir: PathBuf, _s3: S3Args) -> Result<StorageConfig> {
    match backend {
        StorageBackend::Fs => Ok(StorageConfig::Fs(dir)),
        StorageBackend::S3 => Err(SiteForgeError::Config(
            "the s3 backend requires the `s3` feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<AppConfig> {
        let mut argv = vec![
            "site-forge",
            "--gotenberg-url",
            "http://localhost:3000",
            "--deepseek-api-key",
            "sk-test",
        ];
        argv.extend_from_slice(extra);
        let args = CliArgs::try_parse_from(argv).expect("arguments parse");
        AppConfig::try_from(args)
    }

    fn parse_fs(extra: &[&str]) -> Result<AppConfig> {
        let mut argv = vec!["--storage-backend", "fs", "--storage-dir", "/tmp/sites"];
        argv.extend_from_slice(extra);
        parse(&argv)
    }

    #[test]
    fn defaults_validate() {
        let config = parse_fs(&[]).unwrap();
        assert_eq!(config.render.wait_delay(), Duration::from_secs(8));
        assert_eq!(config.render.timeout(), Duration::from_secs(10));
        assert_eq!(config.render.format(), ScreenshotFormat::Png);
        assert!(matches!(config.storage, StorageConfig::Fs(ref dir) if dir == &PathBuf::from("/tmp/sites")));
    }

    #[test]
    fn wait_delay_not_below_timeout_is_rejected() {
        let err = parse_fs(&["--gotenberg-wait-delay", "10", "--gotenberg-timeout", "10"]).unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));

        let err = parse_fs(&["--gotenberg-wait-delay", "30"]).unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));
    }

    #[test]
    fn screenshot_format_is_configurable() {
        let config = parse_fs(&["--gotenberg-screenshot-format", "webp"]).unwrap();
        assert_eq!(config.render.format(), ScreenshotFormat::Webp);
    }

    #[test]
    fn zero_sized_buffers_are_rejected() {
        assert!(parse_fs(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse_fs(&["--archive-queue-size", "0"]).is_err());
        assert!(parse_fs(&["--archive-concurrency", "0"]).is_err());
    }

    #[cfg(feature = "s3")]
    #[test]
    fn s3_backend_requires_endpoint_and_bucket() {
        let err = parse(&["--storage-backend", "s3"]).unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));

        let config = parse(&[
            "--storage-backend",
            "s3",
            "--s3-endpoint-url",
            "http://localhost:9000",
            "--s3-bucket-name",
            "sites",
            "--s3-access-key",
            "minioadmin",
            "--s3-secret-key",
            "minioadmin",
        ])
        .unwrap();
        assert!(matches!(config.storage, StorageConfig::S3(ref s) if s.bucket() == "sites"));
    }

    #[cfg(feature = "s3")]
    #[test]
    fn s3_credentials_come_in_pairs() {
        let err = parse(&[
            "--storage-backend",
            "s3",
            "--s3-endpoint-url",
            "http://localhost:9000",
            "--s3-bucket-name",
            "sites",
            "--s3-access-key",
            "minioadmin",
        ])
        .unwrap_err();
        assert!(matches!(err, SiteForgeError::Config(_)));
    }
}
