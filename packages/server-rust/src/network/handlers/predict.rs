//! Prediction submission and lookup.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inferq_core::{validate_request_id, validate_text, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, AppState};
use crate::error::PipelineError;
use crate::network::HealthState;

/// `POST /predict` body.
#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub text: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// `202 Accepted` body.
#[derive(Debug, Serialize)]
pub struct PredictAccepted {
    pub request_id: String,
    pub status: TaskStatus,
    pub message: String,
}

/// Validates and publishes a request; the caller polls
/// `GET /predict/{request_id}` for the outcome.
pub async fn submit_prediction(
    State(state): State<AppState>,
    body: Result<Json<PredictBody>, JsonRejection>,
) -> Result<(StatusCode, Json<PredictAccepted>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;

    // A malformed request is the caller's fault whatever the bus state.
    validate_text(&body.text).map_err(PipelineError::from)?;
    if let Some(id) = &body.request_id {
        validate_request_id(id).map_err(PipelineError::from)?;
    }

    if state.shutdown.health_state() != HealthState::Ready {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "service is not accepting requests",
        ));
    }
    if !state.submitter.is_connected() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "message bus producer is not connected",
        ));
    }

    let request_id = state.submitter.submit(body.text, body.request_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PredictAccepted {
            request_id,
            status: TaskStatus::Pending,
            message: "request accepted for processing".to_string(),
        }),
    ))
}

/// Returns the cached result, or `pending` when none has arrived (or it was
/// evicted). Never a 404: an unknown identifier is indistinguishable from
/// one still in flight.
pub async fn fetch_prediction(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    match state.cache.get(&request_id) {
        Some(result) => Json(result).into_response(),
        None => Json(json!({
            "request_id": request_id,
            "status": TaskStatus::Pending,
        }))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use inferq_core::{
        PredictionRequest, PredictionResult, WireFormat, MAX_TEXT_CHARS, TOPIC_PREDICTION_REQUESTS,
    };
    use tower::ServiceExt;

    use super::super::test_support::{app_state, ADDR};
    use super::*;
    use crate::bus::MemoryBroker;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/predict", post(submit_prediction))
            .route("/predict/{request_id}", get(fetch_prediction))
            .with_state(state)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accepted_submission_is_published() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();

        let response = router(state)
            .oneshot(post_json(r#"{"text":"great product"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        let id = body["request_id"].as_str().unwrap().to_string();

        let records = broker.records(TOPIC_PREDICTION_REQUESTS);
        assert_eq!(records.len(), 1);
        let request: PredictionRequest = WireFormat::Json.decode(&records[0].payload).unwrap();
        assert_eq!(request.request_id, id);
    }

    #[tokio::test]
    async fn empty_text_is_unprocessable() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();

        let response = router(state).oneshot(post_json(r#"{"text":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("empty"));
        assert!(body.get("request_id").is_none());
        assert!(broker.records(TOPIC_PREDICTION_REQUESTS).is_empty());
    }

    #[tokio::test]
    async fn missing_text_field_is_rejected_with_detail() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();

        let response = router(state)
            .oneshot(post_json(r#"{"request_id":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn unavailable_bus_is_service_unavailable() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();
        broker.set_available(false);

        let response = router(state)
            .oneshot(post_json(r#"{"text":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn invalid_text_is_unprocessable_while_bus_is_down() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();
        broker.set_available(false);
        let app = router(state);

        let response = app.clone().oneshot(post_json(r#"{"text":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let oversized = json!({ "text": "a".repeat(MAX_TEXT_CHARS + 1) }).to_string();
        let response = app.clone().oneshot(post_json(&oversized)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .oneshot(post_json(r#"{"text":"fine","request_id":"  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn draining_service_refuses_submissions() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        let response = router(state)
            .oneshot(post_json(r#"{"text":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(broker.records(TOPIC_PREDICTION_REQUESTS).is_empty());
    }

    #[tokio::test]
    async fn fetch_returns_pending_then_result() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        let cache = state.cache.clone();
        let app = router(state);

        let fetch = |id: &str| {
            Request::builder()
                .uri(format!("/predict/{id}"))
                .body(Body::empty())
                .unwrap()
        };

        let pending = json_body(app.clone().oneshot(fetch("req-9")).await.unwrap()).await;
        assert_eq!(pending, json!({"request_id": "req-9", "status": "pending"}));

        cache.put(
            "req-9",
            PredictionResult::completed("req-9", "POSITIVE", 0.97, "stub", 2.5),
        );
        let done = json_body(app.oneshot(fetch("req-9")).await.unwrap()).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["label"], "POSITIVE");
        assert_eq!(done["model_name"], "stub");
        assert!(done["created_at"].is_string());
    }
}
