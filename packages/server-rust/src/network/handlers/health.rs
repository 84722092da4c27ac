//! Health, liveness, readiness, and metrics endpoints.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed health JSON. Always 200; `status` is `healthy` only while the
/// service is ready and the bus producer is connected.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lifecycle = state.shutdown.health_state();
    let bus_connected = state.submitter.is_connected();
    let status = if bus_connected && lifecycle == HealthState::Ready {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "service": &*state.service_name,
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "bus_connected": bus_connected,
        "state": lifecycle.as_str(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "cached_results": state.cache.size(),
        "in_flight": state.shutdown.in_flight_count(),
    }))
}

/// Liveness probe: 200 while the process can answer at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only when ready and connected to the bus.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready && state.submitter.is_connected() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::super::test_support::{app_state, ADDR};
    use super::*;
    use crate::bus::MemoryBroker;

    #[tokio::test]
    async fn healthy_when_ready_and_connected() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["service"], "inferq-test");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["bus_connected"], true);
        assert_eq!(json["state"], "ready");
        assert_eq!(json["cached_results"], 0);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn degraded_while_starting_or_disconnected() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;

        let json = health_handler(State(state.clone())).await.0;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["state"], "starting");

        state.shutdown.set_ready();
        broker.set_available(false);
        let json = health_handler(State(state)).await.0;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["bus_connected"], false);
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_state_and_bus() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        broker.set_available(false);
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        broker.set_available(true);
        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let broker = MemoryBroker::new(ADDR, 2);
        let state = app_state(&broker).await;
        let response = metrics_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_renders_prometheus_text() {
        let broker = MemoryBroker::new(ADDR, 2);
        let mut state = app_state(&broker).await;
        // Built but not installed globally, so tests stay independent.
        state.metrics = Some(PrometheusBuilder::new().build_recorder().handle());

        let response = metrics_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
