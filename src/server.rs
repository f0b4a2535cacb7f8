//! HTTP surface over the toolkit
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | upload page |
//! | `POST /upload` | multipart `file` field, returns `{filename, file_type, preview}` |
//! | `POST /preprocess/{file_type}` | `{filename, techniques}`, returns the technique report |
//! | `POST /augment/{file_type}` | `{filename, techniques, preprocessed_result?}` |
//! | `GET /health`, `/ready`, `/capabilities`, `/metrics` | service status |

use crate::error::MediaError;
use crate::ffmpeg::FfmpegError;
use crate::toolkit::{AugmentRequest, ProcessRequest, Toolkit};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// 100 MB uploads by default
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    toolkit: Arc<Toolkit>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self {
            toolkit,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub fn router(toolkit: Arc<Toolkit>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/preprocess/{file_type}", post(preprocess))
        .route("/augment/{file_type}", post(augment))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/capabilities", get(capabilities))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(toolkit))
}

#[derive(Debug)]
pub enum ApiError {
    Media(MediaError),
    BadRequest(String),
    Internal(String),
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        ApiError::Media(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Legacy clients read the error field of a 200 response
            ApiError::Media(MediaError::UnsupportedType(_)) => StatusCode::OK,
            ApiError::Media(MediaError::UnsupportedTechnique { .. } | MediaError::InvalidPayload(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Media(MediaError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Media(MediaError::Load { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Media(MediaError::Ffmpeg(FfmpegError::ExecutionFailed(_))) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Media(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Media(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            error!("Request failed: {}", message);
        } else if status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!("Unreadable input: {}", message);
        } else {
            debug!("Client error: {}", message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Run CPU-bound toolkit work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("File field has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;
        file = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    let toolkit = Arc::clone(&state.toolkit);
    let summary = blocking(move || toolkit.upload(&filename, &bytes)).await?;
    Ok(Json(summary))
}

async fn preprocess(
    State(state): State<AppState>,
    Path(file_type): Path<String>,
    request: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let toolkit = Arc::clone(&state.toolkit);
    let report = blocking(move || toolkit.preprocess(&file_type, &request)).await?;
    Ok(Json(report))
}

async fn augment(
    State(state): State<AppState>,
    Path(file_type): Path<String>,
    request: Result<Json<AugmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let toolkit = Arc::clone(&state.toolkit);
    let report = blocking(move || toolkit.augment(&file_type, &request)).await?;
    Ok(Json(report))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_ms": state.started.elapsed().as_millis() as u64,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let lexicon = state.toolkit.lexicon();
    let status = if lexicon.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "ready": lexicon.is_ready(),
        "stopwords": lexicon.stopword_count(),
        "thesaurus_entries": lexicon.thesaurus_len(),
    });
    (status, Json(body))
}

async fn capabilities(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let toolkit = Arc::clone(&state.toolkit);
    let card = blocking(move || Ok(toolkit.describe())).await?;
    Ok(Json(card))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.toolkit.metrics().snapshot())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Media Augment</title>
  <style>
    body { font-family: sans-serif; max-width: 56rem; margin: 2rem auto; }
    pre { background: #f4f4f4; padding: 1rem; white-space: pre-wrap; word-break: break-all; }
    fieldset { margin-bottom: 1rem; }
  </style>
</head>
<body>
  <h1>Media Augment</h1>
  <fieldset>
    <legend>Upload</legend>
    <input type="file" id="file">
    <button id="upload">Upload</button>
  </fieldset>
  <fieldset>
    <legend>Techniques</legend>
    <input type="text" id="techniques" placeholder="comma separated, e.g. lowercase,tokenize" size="48">
    <button id="preprocess">Preprocess</button>
    <button id="augment">Augment</button>
  </fieldset>
  <pre id="output"></pre>
  <script>
    let current = null;
    const show = (value) => {
      document.getElementById('output').textContent = JSON.stringify(value, null, 2);
    };
    const techniques = () => document.getElementById('techniques').value
      .split(',').map((t) => t.trim()).filter((t) => t.length > 0);

    document.getElementById('upload').onclick = async () => {
      const input = document.getElementById('file');
      if (!input.files.length) return;
      const body = new FormData();
      body.append('file', input.files[0]);
      const result = await (await fetch('/upload', { method: 'POST', body })).json();
      if (!result.error) current = result;
      show(result);
    };

    const run = async (stage) => {
      if (!current) return show({ error: 'Upload a file first' });
      const response = await fetch(`/${stage}/${current.file_type}`, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ filename: current.filename, techniques: techniques() }),
      });
      show(await response.json());
    };
    document.getElementById('preprocess').onclick = () => run('preprocess');
    document.getElementById('augment').onclick = () => run('augment');
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: MediaError| ApiError::from(e).status_code();

        assert_eq!(status(MediaError::UnsupportedType("bin".into())), StatusCode::OK);
        assert_eq!(status(MediaError::NotFound("a.txt".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(MediaError::load("a.png", "bad header")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(MediaError::InvalidPayload("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(MediaError::Ffmpeg(FfmpegError::NotInstalled)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::BadRequest("no file".into()).status_code(), StatusCode::BAD_REQUEST);
    }
}
