//! HTTP gateway lifecycle.
//!
//! `new()` takes the shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. Binding
//! separately lets the caller learn the OS-assigned port before serving.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    fetch_prediction, health_handler, liveness_handler, metrics_handler, readiness_handler,
    submit_prediction, AppState,
};
use super::middleware::{build_http_layers, track_requests};

/// How long in-flight requests get to finish after the listener closes.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles the gateway router.
///
/// Routes:
/// - `POST /predict` -- submit text for classification
/// - `GET /predict/{request_id}` -- cached result or `pending`
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe
/// - `GET /metrics` -- Prometheus exposition
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/predict", post(submit_prediction))
        .route("/predict/{request_id}", get(fetch_prediction))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(from_fn_with_state(
            Arc::clone(&state.shutdown),
            track_requests,
        ))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns the listener and router state for one gateway instance.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState) -> Self {
        Self {
            config,
            listener: None,
            state,
        }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Binds the listener and returns the bound port, which differs from
    /// the configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "HTTP listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves or the controller is triggered
    /// elsewhere, then moves the service to `Draining` and waits up to
    /// [`DRAIN_TIMEOUT`] for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.router();
        let listener = self
            .listener
            .context("start() must be called before serve()")?;
        let controller = Arc::clone(&self.state.shutdown);

        let signal_controller = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = shutdown => signal_controller.trigger_shutdown(),
                    () = signal_controller.wait_for_signal() => {}
                }
            })
            .await?;

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("HTTP requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests still in flight"
            );
        }
        Ok(())
    }
}
