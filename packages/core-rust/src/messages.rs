//! Bus message schemas exchanged between the gateway and the worker.
//!
//! Field names are the wire names; both the JSON and the named-field
//! `MsgPack` encodings carry them verbatim so either side can decode a
//! message without sharing anything beyond these structs.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Topic carrying [`PredictionRequest`] messages from the gateway to workers.
pub const TOPIC_PREDICTION_REQUESTS: &str = "ml.prediction.requests";

/// Topic carrying [`PredictionResult`] messages from workers to the gateway.
pub const TOPIC_PREDICTION_RESULTS: &str = "ml.prediction.results";

/// Label attached to every result whose processing failed.
pub const FAILED_LABEL: &str = "ERROR";

/// Identifier used for a failed result when neither the payload nor the
/// record key yields a usable request identifier.
pub const UNKNOWN_REQUEST_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Current UTC time as an RFC 3339 string with microsecond precision.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Lifecycle status of a prediction.
///
/// `Completed` and `Failed` are terminal. `Processing` is part of the wire
/// vocabulary but is never emitted by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Wire string for this status, also used as a metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Request published by the gateway for asynchronous classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub request_id: String,
    pub text: String,
    #[serde(default = "now_timestamp")]
    pub created_at: String,
}

impl PredictionRequest {
    /// Builds a request stamped with the current time.
    #[must_use]
    pub fn new(request_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            text: text.into(),
            created_at: now_timestamp(),
        }
    }
}

/// Result produced by the worker for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub request_id: String,
    pub label: String,
    pub score: f64,
    /// Identifier of the classification engine that produced the result.
    pub model_name: String,
    pub inference_time_ms: f64,
    #[serde(default = "default_result_status")]
    pub status: TaskStatus,
    #[serde(default = "now_timestamp")]
    pub created_at: String,
}

fn default_result_status() -> TaskStatus {
    TaskStatus::Completed
}

impl PredictionResult {
    /// Builds a completed result.
    #[must_use]
    pub fn completed(
        request_id: impl Into<String>,
        label: impl Into<String>,
        score: f64,
        model_name: impl Into<String>,
        inference_time_ms: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            label: label.into(),
            score,
            model_name: model_name.into(),
            inference_time_ms,
            status: TaskStatus::Completed,
            created_at: now_timestamp(),
        }
    }

    /// Builds a failed result: sentinel label, zero score, zero duration.
    #[must_use]
    pub fn failed(request_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            label: FAILED_LABEL.to_string(),
            score: 0.0,
            model_name: model_name.into(),
            inference_time_ms: 0.0,
            status: TaskStatus::Failed,
            created_at: now_timestamp(),
        }
    }
}
