//! Builder for wiring a generator, storage and renderer into a running
//! pipeline.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::archive::{ArchiveKeys, Archiver};
use crate::generator::ContentGenerator;
use crate::handle::PipelineHandle;
use crate::pipeline::GenerationPipeline;
use crate::render::Renderer;
use crate::storage::Storage;
use crate::worker;

/// Builder for configuring and starting a [`PipelineHandle`].
///
/// The storage backend is passed as an [`Arc`] because the HTTP layer reads
/// from the same instance the archive worker writes to.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use site_forge::{
///     ChatCompletionGenerator, ChatSettings, FsStorage, GotenbergRenderer, PipelineBuilder,
///     RenderSettings,
/// };
///
/// # async fn example() -> site_forge::Result<()> {
/// let generator = ChatCompletionGenerator::new(ChatSettings::new("sk-..."))?;
/// let renderer = GotenbergRenderer::connect(RenderSettings::builder("http://localhost:3000").build()?)?;
/// let storage = Arc::new(FsStorage::new("/tmp/sites"));
///
/// let handle = PipelineBuilder::new(generator, storage, renderer)
///     .stream_buffer(32)
///     .prefix("sites")
///     .build();
///
/// // ... serve requests with handle.pipeline() ...
///
/// handle.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PipelineBuilder<G, S, R> {
    generator: G,
    storage: Arc<S>,
    renderer: R,
    stream_buffer: usize,
    archive_queue: usize,
    archive_concurrency: usize,
    prefix: String,
}

impl<G: ContentGenerator, S: Storage, R: Renderer> PipelineBuilder<G, S, R> {
    /// Create a new builder with sensible defaults.
    ///
    /// Defaults: stream buffer 16, archive queue 256, archive concurrency 8,
    /// no key prefix.
    pub fn new(generator: G, storage: Arc<S>, renderer: R) -> Self {
        Self {
            generator,
            storage,
            renderer,
            stream_buffer: 16,
            archive_queue: 256,
            archive_concurrency: 8,
            prefix: String::new(),
        }
    }

    /// Fragments buffered between a generation and its client. Raised to 1
    /// if set lower.
    pub fn stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size.max(1);
        self
    }

    /// Finished generations queued for archival, on top of those being
    /// archived, before pumps wait on the worker. Raised to 1 if set lower.
    pub fn archive_queue(mut self, size: usize) -> Self {
        self.archive_queue = size.max(1);
        self
    }

    /// Jobs the worker archives at the same time. Raised to 1 if set lower.
    pub fn archive_concurrency(mut self, limit: usize) -> Self {
        self.archive_concurrency = limit.max(1);
        self
    }

    /// Set a prefix that is prepended to every storage key (separated by `/`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Consume the builder, spawn the archive worker, and return the
    /// [`PipelineHandle`] used to start generations and shut down.
    pub fn build(self) -> PipelineHandle<G> {
        let keys = ArchiveKeys::new(self.prefix, self.renderer.format());
        let (tx, rx) = mpsc::channel(self.archive_queue);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let archiver = Archiver::new(self.storage, Arc::new(self.renderer), keys.clone());
        let worker_handle = tokio::spawn(worker::run(
            rx,
            shutdown_rx,
            archiver,
            self.archive_concurrency,
        ));

        let pipeline = GenerationPipeline::new(Arc::new(self.generator), tx, self.stream_buffer);
        PipelineHandle::new(pipeline, keys, shutdown_tx, worker_handle)
    }
}
