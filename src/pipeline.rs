//! The generate-stream-and-archive pipeline.
//!
//! [`GenerationPipeline::run`] spawns a generation task into the pipeline's
//! own [`TaskTracker`] and waits only for it to report whether the generator
//! produced a first item. The task then pumps the stream: it forwards every
//! fragment to the caller through a channel and appends it to an accumulator
//! it owns exclusively. The caller's half is only a receiver: dropping it, or
//! the `run` future itself (client disconnect), stops delivery and nothing
//! else. When the generator is exhausted the pump seals the accumulator and
//! hands it to the archive worker, so archival runs whether or not anyone is
//! still listening.
//!
//! Concurrent runs for the same target are not deduplicated; both archive and
//! the last upload wins at the storage layer.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::archive::ArchiveJob;
use crate::error::{Result, SiteForgeError};
use crate::generator::{ContentGenerator, FragmentStream};

/// A validated request to generate the site identified by `target_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    target_id: u64,
    prompt: String,
}

impl GenerationRequest {
    /// Fails with [`SiteForgeError::InvalidRequest`] for a blank prompt.
    pub fn new(target_id: u64, prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(SiteForgeError::InvalidRequest(
                "prompt must not be empty".into(),
            ));
        }
        Ok(Self { target_id, prompt })
    }

    pub fn target_id(&self) -> u64 {
        self.target_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Fragments of one generation, in production order, as seen by the client.
pub type FragmentReceiver = ReceiverStream<Bytes>;

/// Cloneable entry point for starting generations.
///
/// Obtained from [`PipelineHandle::pipeline`](crate::PipelineHandle::pipeline).
pub struct GenerationPipeline<G> {
    generator: Arc<G>,
    jobs: mpsc::Sender<ArchiveJob>,
    tracker: TaskTracker,
    stream_buffer: usize,
}

impl<G> Clone for GenerationPipeline<G> {
    fn clone(&self) -> Self {
        Self {
            generator: self.generator.clone(),
            jobs: self.jobs.clone(),
            tracker: self.tracker.clone(),
            stream_buffer: self.stream_buffer,
        }
    }
}

impl<G: ContentGenerator> GenerationPipeline<G> {
    pub(crate) fn new(
        generator: Arc<G>,
        jobs: mpsc::Sender<ArchiveJob>,
        stream_buffer: usize,
    ) -> Self {
        Self {
            generator,
            jobs,
            tracker: TaskTracker::new(),
            stream_buffer,
        }
    }

    /// Start generating `request` and return the client-facing fragment
    /// stream.
    ///
    /// Errors are returned only when nothing has been produced yet: the
    /// pipeline is shutting down, the generator could not be opened, or its
    /// first item was an error. In those cases nothing is archived.
    ///
    /// The generation runs in its own task from the start, so dropping this
    /// future (client disconnect before the first fragment) or the returned
    /// stream does not stop it: the full content is archived exactly once.
    pub async fn run(&self, request: GenerationRequest) -> Result<FragmentReceiver> {
        if self.tracker.is_closed() {
            return Err(SiteForgeError::ShuttingDown);
        }
        let GenerationRequest { target_id, prompt } = request;

        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let (started_tx, started_rx) = oneshot::channel();
        self.tracker.spawn(
            generation(
                target_id,
                prompt,
                self.generator.clone(),
                started_tx,
                tx,
                self.jobs.clone(),
            )
            .instrument(tracing::info_span!("generation", target_id)),
        );

        match started_rx.await {
            Ok(Ok(())) => Ok(ReceiverStream::new(rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SiteForgeError::Generation(
                "generation task ended before starting".into(),
            )),
        }
    }

    /// Number of generations still streaming or draining.
    pub fn active_generations(&self) -> usize {
        self.tracker.len()
    }

    /// Refuse new generations and wait for the running ones to hand off
    /// their content.
    pub(crate) async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Open the generator and wait for its first item, then report the start
/// outcome and keep pumping regardless of whether anyone is still waiting.
async fn generation<G: ContentGenerator>(
    target_id: u64,
    prompt: String,
    generator: Arc<G>,
    started: oneshot::Sender<Result<()>>,
    client: mpsc::Sender<Bytes>,
    jobs: mpsc::Sender<ArchiveJob>,
) {
    let mut upstream = match generator.generate(&prompt).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!("Generation could not start: {e}");
            let _ = started.send(Err(e));
            return;
        }
    };

    let first = match upstream.next().await {
        Some(Ok(fragment)) => Some(Ok::<_, SiteForgeError>(fragment)),
        Some(Err(e)) => {
            tracing::warn!("Generation failed before the first fragment: {e}");
            let _ = started.send(Err(e));
            return;
        }
        None => None,
    };
    if started.send(Ok(())).is_err() {
        tracing::debug!("Caller left before the first fragment");
    }

    let upstream = futures::stream::iter(first).chain(upstream).boxed();
    pump(target_id, upstream, client, jobs).await;
}

/// Drive one generation to the end, relaying fragments while the client
/// listens, then hand the sealed content to the archive worker.
async fn pump(
    target_id: u64,
    mut upstream: FragmentStream,
    client: mpsc::Sender<Bytes>,
    jobs: mpsc::Sender<ArchiveJob>,
) {
    let mut content = BytesMut::new();
    let mut client_connected = true;
    let mut fragments = 0usize;

    while let Some(item) = upstream.next().await {
        match item {
            Ok(fragment) => {
                content.extend_from_slice(&fragment);
                fragments += 1;
                if client_connected && client.send(fragment).await.is_err() {
                    client_connected = false;
                    tracing::info!(fragments, "Client disconnected, draining generator");
                }
            }
            Err(e) => {
                tracing::warn!(fragments, "Generation failed mid-stream: {e}");
                break;
            }
        }
    }
    // Ends the client's stream before archival starts.
    drop(client);
    drop(upstream);

    let content = content.freeze();
    tracing::debug!(fragments, bytes = content.len(), "Generation finished");

    if jobs.send(ArchiveJob { target_id, content }).await.is_err() {
        tracing::error!("Archive worker is gone, content of {target_id} was not archived");
    }
}
