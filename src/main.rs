use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use site_forge::settings::{AppConfig, CliArgs};
use site_forge::telemetry::init_telemetry;
use site_forge::{
    AppState, ChatCompletionGenerator, GotenbergRenderer, PipelineBuilder, Storage, router,
};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::try_from(CliArgs::parse())?;
    init_telemetry(config.log_json)?;

    let storage = Arc::new(config.storage.open());
    storage
        .connect()
        .await
        .context("failed to connect storage")?;

    let renderer = GotenbergRenderer::connect(config.render)?;
    let generator = ChatCompletionGenerator::new(config.generator)?;

    let handle = PipelineBuilder::new(generator, storage.clone(), renderer)
        .stream_buffer(config.stream_buffer_size)
        .archive_queue(config.archive_queue_size)
        .archive_concurrency(config.archive_concurrency)
        .prefix(config.key_prefix)
        .build();
    let state = AppState::new(handle.pipeline(), storage.clone(), handle.keys().clone());

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    tracing::info!("Listening on {}", config.server_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped, archiving pending generations");
    handle.shutdown().await;
    storage.disconnect().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
