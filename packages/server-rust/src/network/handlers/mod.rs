//! Gateway HTTP handlers and the state they share.

pub mod health;
pub mod predict;

pub use health::{health_handler, liveness_handler, metrics_handler, readiness_handler};
pub use predict::{fetch_prediction, submit_prediction};

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;

use super::ShutdownController;
use crate::cache::ResultCache;
use crate::error::PipelineError;
use crate::pipeline::RequestSubmitter;

/// Shared application state passed to all handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<RequestSubmitter>,
    pub cache: Arc<ResultCache>,
    pub shutdown: Arc<ShutdownController>,
    /// Renders `/metrics`; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    pub service_name: Arc<str>,
    pub start_time: Instant,
}

/// Error body returned to HTTP callers: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(inner) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, inner.to_string())
            }
            PipelineError::Publish { .. }
            | PipelineError::Connection { .. }
            | PipelineError::Bus(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("message bus unavailable: {err}"),
            ),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
