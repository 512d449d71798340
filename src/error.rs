//! Error taxonomy shared by the pipeline, the CLI and the dashboard API.
//!
//! The variants keep three user-facing situations apart: a feature that is
//! not configured, a configured backend that failed, and data that does not
//! exist yet.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required secret is absent. The dependent feature is disabled.
    #[error("{0} is not configured")]
    ConfigMissing(String),

    #[error("fetching news failed: {0}")]
    FetchFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Per-item; batches record it as `Unknown` and keep going.
    #[error("classification failed: {0}")]
    ClassificationFailed(String),

    #[error("warehouse upload failed: {0}")]
    UploadFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Stable machine-readable kind, used in API bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigMissing(_) => "config_missing",
            PipelineError::FetchFailed(_) => "fetch_failed",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::ClassificationFailed(_) => "classification_failed",
            PipelineError::UploadFailed(_) => "upload_failed",
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Io(_) => "io",
            PipelineError::Csv(_) => "csv",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::ConfigMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::FetchFailed(_) | PipelineError::UploadFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::ClassificationFailed(_)
            | PipelineError::Io(_)
            | PipelineError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Display plus every `source()`; reqwest keeps timeouts and connect errors there.
pub(crate) fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(inner) = cur {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        cur = inner.source();
    }
    out
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_not_configured_apart_from_failures() {
        let missing = PipelineError::ConfigMissing("API_KEY".into());
        let failed = PipelineError::FetchFailed("HTTP 401".into());
        let absent = PipelineError::NotFound("gnews_output.csv".into());

        assert_eq!(missing.to_string(), "API_KEY is not configured");
        assert!(failed.to_string().contains("HTTP 401"));
        assert_eq!(absent.to_string(), "gnews_output.csv not found");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            PipelineError::ConfigMissing("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PipelineError::UploadFailed("quota".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            PipelineError::NotFound("f".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PipelineError::InvalidInput("n".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
