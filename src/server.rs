//! HTTP surface: the streaming generate endpoint plus archive retrieval.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /sites/{id}/generate` | Stream generated HTML, archive it afterwards. |
//! | `GET /sites/{id}/links` | Retrieval URLs of the archived artifacts. |
//! | `GET /media/{*key}` | Archived object bytes (`?download=true` for attachment). |
//! | `GET /health` | Liveness probe. |

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveKeys;
use crate::error::SiteForgeError;
use crate::generator::ContentGenerator;
use crate::pipeline::{GenerationPipeline, GenerationRequest};
use crate::storage::{Disposition, Storage};

/// Shared state of the HTTP layer.
pub struct AppState<G, S> {
    pipeline: GenerationPipeline<G>,
    storage: Arc<S>,
    keys: ArchiveKeys,
}

impl<G, S> Clone for AppState<G, S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            storage: self.storage.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<G: ContentGenerator, S: Storage> AppState<G, S> {
    /// `keys` must be the ones the pipeline archives under, see
    /// [`PipelineHandle::keys`](crate::PipelineHandle::keys).
    pub fn new(pipeline: GenerationPipeline<G>, storage: Arc<S>, keys: ArchiveKeys) -> Self {
        Self {
            pipeline,
            storage,
            keys,
        }
    }
}

pub fn router<G: ContentGenerator, S: Storage>(state: AppState<G, S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sites/{id}/generate", post(generate::<G, S>))
        .route("/sites/{id}/links", get(links::<G, S>))
        .route("/media/{*key}", get(media::<G, S>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteLinks {
    html_code_url: String,
    html_code_download_url: String,
    screenshot_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct MediaQuery {
    #[serde(default)]
    download: bool,
}

async fn health() -> &'static str {
    "ok"
}

async fn generate<G: ContentGenerator, S: Storage>(
    State(state): State<AppState<G, S>>,
    Path(id): Path<u64>,
    Json(body): Json<GenerateBody>,
) -> Result<Response, SiteForgeError> {
    let request = GenerationRequest::new(id, body.prompt)?;
    let fragments = state.pipeline.run(request).await?;

    let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response())
}

async fn links<G: ContentGenerator, S: Storage>(
    State(state): State<AppState<G, S>>,
    Path(id): Path<u64>,
) -> Json<SiteLinks> {
    let html = state.keys.html(id);
    let screenshot = state.keys.screenshot(id);
    Json(SiteLinks {
        html_code_url: state.storage.object_url(&html, Disposition::Inline),
        html_code_download_url: state.storage.object_url(&html, Disposition::Attachment),
        screenshot_url: state.storage.object_url(&screenshot, Disposition::Inline),
    })
}

async fn media<G: ContentGenerator, S: Storage>(
    State(state): State<AppState<G, S>>,
    Path(key): Path<String>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, SiteForgeError> {
    let content = state.storage.download(&key).await?;

    let disposition = if query.download {
        Disposition::Attachment
    } else {
        Disposition::Inline
    };
    let file_name = key.rsplit('/').next().unwrap_or(&key).replace('"', "_");

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&key).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"{file_name}\"", disposition.as_str()),
            ),
        ],
        content,
    )
        .into_response())
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "html" || ext == "htm" => "text/html; charset=utf-8",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpeg" || ext == "jpg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

impl IntoResponse for SiteForgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidRequest(_) | Self::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Generation(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ShuttingDown | Self::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("42.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("v1/42.PNG"), "image/png");
        assert_eq!(content_type_for("42.jpg"), "image/jpeg");
        assert_eq!(content_type_for("42.webp"), "image/webp");
        assert_eq!(content_type_for("42"), "application/octet-stream");
    }

    #[test]
    fn error_statuses() {
        let status = |e: SiteForgeError| e.into_response().status();
        assert_eq!(status(SiteForgeError::InvalidRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(SiteForgeError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(SiteForgeError::Generation("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(SiteForgeError::ShuttingDown), StatusCode::SERVICE_UNAVAILABLE);
    }
}
