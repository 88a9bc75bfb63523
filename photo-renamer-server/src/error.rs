//! Error taxonomy for the rename pipeline and its HTTP mapping.
//!
//! Per-file problems are [`FileRejection`]s: they are logged, counted and
//! turned into warnings. Anything in [`PipelineError`] ends the request.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why a single uploaded file was skipped.
#[derive(Debug, thiserror::Error)]
pub enum FileRejection {
    #[error("extension of {0:?} is not allowed")]
    Extension(String),
    #[error("filename {0:?} sanitizes to nothing")]
    EmptyName(String),
    #[error("{name:?} is {size} bytes, over the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("{name:?} is not a decodable image: {source}")]
    Undecodable {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("reading staged upload {name:?} failed: {source}")]
    Staging {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures that abort the whole operation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no location names were supplied")]
    NoLocations,
    #[error("batch of {attempted} bytes exceeds the {limit} byte limit")]
    BatchSizeExceeded { attempted: u64, limit: u64 },
    #[error("no valid images were accepted")]
    EmptyBatch,
    #[error("no archives were supplied")]
    NoArchives,
    #[error("input archives contained no files")]
    EmptyMerge,
    #[error("writing archive failed: {0}")]
    ArchiveWrite(#[source] zip::result::ZipError),
    #[error("input archive {name:?} is not readable: {source}")]
    ArchiveParse {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("staging upload failed: {0}")]
    Staging(#[source] std::io::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Staging(e)
    }
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::NoLocations
            | PipelineError::NoArchives
            | PipelineError::ArchiveParse { .. } => StatusCode::BAD_REQUEST,
            PipelineError::BatchSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::EmptyBatch | PipelineError::EmptyMerge => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PipelineError::ArchiveWrite(_) | PipelineError::Staging(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the caller: no paths, no source chains.
    pub fn client_message(&self) -> String {
        match self {
            PipelineError::NoLocations => "Please enter at least one location name.".into(),
            PipelineError::BatchSizeExceeded { limit, .. } => format!(
                "Total batch size would exceed the {}MB limit. Please reduce the number of files.",
                limit / (1024 * 1024)
            ),
            PipelineError::EmptyBatch => {
                "No valid images were processed. Please check your files and try again.".into()
            }
            PipelineError::NoArchives => "No ZIP files provided.".into(),
            PipelineError::EmptyMerge | PipelineError::ArchiveParse { .. } => {
                "Failed to combine ZIP files.".into()
            }
            PipelineError::ArchiveWrite(_) | PipelineError::Staging(_) => {
                "An error occurred while creating the download file. Please try again.".into()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// HTTP-facing error. Wraps pipeline failures and request-shape problems.
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Status(StatusCode, String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        let status = e.status();
        tracing::warn!(error = %e, %status, "multipart read failed");
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload size too large. Please reduce the number of files."
        } else {
            "Malformed upload."
        };
        ApiError::Status(status, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pipeline(e) => {
                let status = e.status();
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                } else {
                    tracing::warn!(error = %e, "request rejected");
                }
                (status, e.client_message())
            }
            ApiError::Status(s, m) => (s, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
