//! Handle for starting generations and controlling the pipeline lifecycle.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::archive::ArchiveKeys;
use crate::generator::ContentGenerator;
use crate::pipeline::GenerationPipeline;

/// Primary handle returned by [`PipelineBuilder::build`](crate::PipelineBuilder::build).
///
/// Owns the archive worker's shutdown signal and join handle. Hand out
/// [`GenerationPipeline`] clones via [`pipeline`](Self::pipeline) and call
/// [`shutdown`](Self::shutdown) once before exit.
///
/// Dropping the handle without calling `shutdown` lets the worker finish the
/// jobs already queued, but generations still running at that point are not
/// archived.
pub struct PipelineHandle<G> {
    pipeline: GenerationPipeline<G>,
    keys: ArchiveKeys,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<G: ContentGenerator> PipelineHandle<G> {
    pub(crate) fn new(
        pipeline: GenerationPipeline<G>,
        keys: ArchiveKeys,
        shutdown: oneshot::Sender<()>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            pipeline,
            keys,
            shutdown: Some(shutdown),
            worker: Some(worker),
        }
    }

    /// A cloneable pipeline sharing this handle's generator and worker.
    pub fn pipeline(&self) -> GenerationPipeline<G> {
        self.pipeline.clone()
    }

    /// Keys the archive worker stores artifacts under.
    pub fn keys(&self) -> &ArchiveKeys {
        &self.keys
    }

    /// Gracefully shut down the pipeline.
    ///
    /// Refuses new generations, waits for running ones to drain their
    /// generator and queue their content, then signals the worker and waits
    /// until every queued job has been archived.
    pub async fn shutdown(mut self) {
        let active = self.pipeline.active_generations();
        if active > 0 {
            tracing::info!("Waiting for {active} generations to finish");
        }
        self.pipeline.drain().await;

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                tracing::error!("Archive worker failed: {e}");
            }
        }
    }
}
