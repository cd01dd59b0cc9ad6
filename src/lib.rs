//! # site_forge
//!
//! Generate HTML pages from a prompt, stream them to the caller as they are
//! produced, and archive every finished page together with a rendered
//! screenshot.
//!
//! ## Overview
//!
//! A [`GenerationPipeline`] asks a [`ContentGenerator`] for a stream of HTML
//! fragments and forwards each one to the caller. The accumulated page is
//! handed to a background archive worker once the generator is exhausted,
//! whether or not the caller is still listening. The worker stores the HTML
//! in a [`Storage`] backend, renders it with a [`Renderer`], and stores the
//! screenshot next to it.
//!
//! A client disconnect never interrupts archival: the generator keeps being
//! drained and the page is saved anyway.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use site_forge::{
//!     ChatCompletionGenerator, ChatSettings, FsStorage, GenerationRequest, GotenbergRenderer,
//!     PipelineBuilder, RenderSettings,
//! };
//!
//! # async fn example() -> site_forge::Result<()> {
//! let generator = ChatCompletionGenerator::new(ChatSettings::new("sk-..."))?;
//! let renderer = GotenbergRenderer::connect(RenderSettings::builder("http://localhost:3000").build()?)?;
//! let handle = PipelineBuilder::new(generator, Arc::new(FsStorage::new("/tmp/sites")), renderer).build();
//!
//! let mut fragments = handle
//!     .pipeline()
//!     .run(GenerationRequest::new(42, "A landing page for a bakery")?)
//!     .await?;
//! while let Some(fragment) = fragments.next().await {
//!     print!("{}", String::from_utf8_lossy(&fragment));
//! }
//!
//! // Waits for running generations and pending archive jobs.
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `s3` | **yes** | Enables [`S3Storage`] backed by `aws-sdk-s3` / `aws-config`. |
//! | `rustls-tls` | no | Use `rustls` instead of the platform TLS for the AWS SDK and HTTP clients. |

pub mod archive;
pub mod config;
pub mod error;
pub mod generator;
pub mod handle;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod settings;
pub mod storage;
pub mod telemetry;
mod worker;

pub use archive::{ArchiveJob, ArchiveKeys, ArchiveReport, Archiver};
pub use config::PipelineBuilder;
pub use error::{Result, SiteForgeError};
pub use generator::{ChatCompletionGenerator, ChatSettings, ContentGenerator, FragmentStream};
pub use handle::PipelineHandle;
pub use pipeline::{FragmentReceiver, GenerationPipeline, GenerationRequest};
pub use render::{
    GotenbergRenderer, RenderSettings, RenderSettingsBuilder, Renderer, ScreenshotFormat,
};
pub use server::{AppState, router};
#[cfg(feature = "s3")]
pub use storage::{S3Settings, S3Storage};
pub use storage::{AnyStorage, Disposition, FsStorage, Storage};
