//! Background worker that runs the archival phase for finished generations.
//!
//! This module is internal -- users interact with it indirectly through
//! [`PipelineHandle`](crate::PipelineHandle).

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::{mpsc, oneshot};

use crate::archive::{ArchiveJob, Archiver};
use crate::render::Renderer;
use crate::storage::Storage;

/// At most `concurrency` jobs are archived at once. While that many are in
/// flight, new jobs stay in the channel so its capacity bounds what pumps can
/// hand off before they wait.
pub async fn run<S: Storage, R: Renderer>(
    mut rx: mpsc::Receiver<ArchiveJob>,
    mut shutdown_rx: oneshot::Receiver<()>,
    archiver: Archiver<S, R>,
    concurrency: usize,
) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                tracing::info!("Shutdown signal received, draining archive queue");
                rx.close();
                loop {
                    while in_flight.len() < concurrency {
                        match rx.try_recv() {
                            Ok(job) => in_flight.push(archiver.archive(job)),
                            Err(_) => break,
                        }
                    }
                    if in_flight.next().await.is_none() {
                        break;
                    }
                }
                tracing::info!("Archive worker shut down");
                return;
            }

            Some(report) = in_flight.next(), if !in_flight.is_empty() => {
                tracing::debug!(?report, "Archive job finished");
            }

            Some(job) = rx.recv(), if in_flight.len() < concurrency => {
                tracing::debug!(target_id = job.target_id, "Archive job received");
                in_flight.push(archiver.archive(job));
            }
        }
    }
}
