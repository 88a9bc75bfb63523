use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, instrument};

use crate::archive::{self, ArchiveInput};
use crate::batch::UploadGroup;
use crate::capture_time::CaptureTimeReader;
use crate::config;
use crate::error::{ApiError, PipelineError};
use crate::pipeline::{self, ProcessParams};
use crate::progress::{ProgressSnapshot, ProgressTracker, SharedProgress};
use crate::staging::StagedFile;
#[cfg(feature = "embed_ui")]
use crate::ui;

/// Name of the archive returned in merge mode.
pub const COMBINED_ARCHIVE_NAME: &str = "all_photos_combined.zip";

/// Extra room over the batch cap for multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub cfg: config::SharedConfig,
    pub progress: SharedProgress,
    pub reader: Arc<dyn CaptureTimeReader>,
}

/// Parsed multipart submission. Staged photos are deleted if this is dropped.
#[derive(Debug, Default)]
struct UploadForm {
    locations: Vec<String>,
    photos: HashMap<usize, Vec<StagedFile>>,
    sequence_numbers: Option<String>,
    progress_id: Option<String>,
    combine: bool,
    archives: Vec<ArchiveInput>,
}

impl UploadForm {
    /// Pair each `locations[]` entry with its `photos_<i>` files.
    fn into_groups(mut self) -> Vec<UploadGroup> {
        let locations = std::mem::take(&mut self.locations);
        locations
            .into_iter()
            .enumerate()
            .map(|(idx, label)| UploadGroup {
                label,
                files: self.photos.remove(&idx).unwrap_or_default(),
            })
            .collect()
    }
}

/// Parse the optional JSON sequence array. Negative or non-integer slots become `None`.
fn parse_sequence_numbers(raw: Option<&str>) -> Option<Vec<Option<u32>>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => Some(
            values
                .iter()
                .map(|v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
                .collect(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed sequence_numbers");
            None
        }
    }
}

async fn read_form(multipart: &mut Multipart, staging_dir: &FsPath) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        match name.as_str() {
            "locations[]" => form.locations.push(field.text().await?),
            "sequence_numbers" => form.sequence_numbers = Some(field.text().await?),
            "progress_id" => form.progress_id = Some(field.text().await?),
            "combine_zips" => form.combine = true,
            n if n.starts_with("photos_") => {
                let Ok(idx) = n["photos_".len()..].parse::<usize>() else {
                    tracing::debug!(field = %n, "ignoring photo field with bad index");
                    continue;
                };
                if file_name.is_empty() {
                    continue;
                }
                let mut staged =
                    StagedFile::create(staging_dir, &file_name).map_err(PipelineError::Staging)?;
                while let Some(chunk) = field.chunk().await? {
                    staged.append(&chunk).map_err(PipelineError::Staging)?;
                }
                form.photos.entry(idx).or_default().push(staged);
            }
            n if n.starts_with("zip_") => {
                if file_name.is_empty() {
                    continue;
                }
                let data = field.bytes().await?.to_vec();
                form.archives.push(ArchiveInput {
                    name: file_name,
                    data,
                });
            }
            other => tracing::debug!(field = %other, "ignoring unknown form field"),
        }
    }
    Ok(form)
}

fn zip_response(download_name: &str) -> axum::http::response::Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
}

fn internal(message: &str) -> ApiError {
    ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

/// Rename-and-pack, or merge when `combine_zips` is present.
#[instrument(skip_all)]
pub async fn process_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let cfg = config::ConfigManager::to_struct(&state.cfg).await.map_err(|e| {
        tracing::error!(error = %e, "config unavailable");
        internal("Configuration unavailable.")
    })?;
    let form = read_form(&mut multipart, &cfg.staging_dir()).await?;

    if form.combine {
        return combine_archives(form.archives).await;
    }
    if form.locations.iter().all(|l| l.trim().is_empty()) {
        return Err(PipelineError::NoLocations.into());
    }

    let token = ProgressTracker::token_from(form.progress_id.as_deref());
    let sequence_numbers = parse_sequence_numbers(form.sequence_numbers.as_deref());
    let params = ProcessParams {
        groups: form.into_groups(),
        sequence_numbers,
        limits: cfg.upload_limits(),
        reader: state.reader.clone(),
        progress: state.progress.clone(),
        token: token.clone(),
    };
    let out = tokio::task::spawn_blocking(move || pipeline::process(params))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "rename task panicked");
            internal("An internal error occurred. Please try again.")
        })??;

    for w in &out.warnings {
        tracing::warn!(session = %token, warning = %w, "batch completed with warnings");
    }
    zip_response(&out.download_name)
        .header("x-progress-id", token.as_str())
        .header("x-skipped-files", out.skipped_files.to_string())
        .header("x-skipped-locations", out.rejected_locations.to_string())
        .body(Body::from(out.bytes))
        .map_err(|e| {
            tracing::error!(error = %e, "building response failed");
            internal("An internal error occurred. Please try again.")
        })
}

async fn combine_archives(archives: Vec<ArchiveInput>) -> Result<Response, ApiError> {
    let count = archives.len();
    let bytes = tokio::task::spawn_blocking(move || archive::merge_archives(&archives))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "merge task panicked");
            internal("Failed to combine ZIP files.")
        })??;
    tracing::info!(archives = count, bytes = bytes.len(), "archives combined");
    zip_response(COMBINED_ARCHIVE_NAME)
        .body(Body::from(bytes))
        .map_err(|_| internal("Failed to combine ZIP files."))
}

pub async fn get_progress(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.progress.snapshot(&session_id) {
        Some(snap) => Json(snap).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ProgressSnapshot::not_found())).into_response(),
    }
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<config::Config>, StatusCode> {
    config::ConfigManager::to_struct(&state.cfg)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// Logs all 4xx/5xx responses with method, URI, status and latency.
async fn log_error_responses(req: axum::extract::Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();
    let res = next.run(req).await;
    let status = res.status();
    if status.is_server_error() {
        tracing::error!(%method, %uri, %status, elapsed_ms = start.elapsed().as_millis(), "http 5xx");
    } else if status.is_client_error() {
        tracing::warn!(%method, %uri, %status, elapsed_ms = start.elapsed().as_millis(), "http 4xx");
    }
    res
}

/// Build the app. `max_batch_bytes` sizes the upload body limit.
pub fn router(state: AppState, max_batch_bytes: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::ERROR));

    let body_limit = usize::try_from(max_batch_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/config", get(get_config))
        .route(
            "/process",
            post(process_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/progress/{id}", get(get_progress))
        .with_state(state)
        .layer(cors)
        .layer(trace)
        .layer(middleware::from_fn(log_error_responses));

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api);

    #[cfg(feature = "embed_ui")]
    let app = app
        .route("/", get(ui::serve_ui))
        .route("/{*path}", get(ui::serve_ui));

    app
}

/// Serve the HTTP API on `bind`.
pub async fn serve(app: Router, bind: String) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    tracing::info!(addr=%addr, "starting http server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
