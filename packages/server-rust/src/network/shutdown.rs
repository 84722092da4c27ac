//! Process lifecycle: health state, in-flight HTTP requests, and the stop signal.
//!
//! One [`ShutdownController`] is shared by the HTTP layer and the background
//! loops. HTTP middleware holds an [`InFlightGuard`] per request; the loops
//! watch [`ShutdownController::shutdown_receiver`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::observability::GATEWAY_ACTIVE_CONNECTIONS;

/// Lifecycle state: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Bus handles are being established.
    Starting,
    /// Accepting submissions.
    Ready,
    /// Stop requested; in-flight requests are finishing.
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared lifecycle handle.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Receiver that turns `true` once [`trigger_shutdown`](Self::trigger_shutdown) runs.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and signals every receiver. Idempotent.
    pub fn trigger_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        info!("shutdown triggered");
        self.health_state.store(Arc::new(HealthState::Draining));
        // Stores the flag even when no receiver is alive.
        self.shutdown_signal.send_replace(true);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_signal.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait_for_signal(&self) {
        let mut rx = self.shutdown_receiver();
        // Err only if the sender is dropped, which cannot happen while `self` lives.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Marks the process fully stopped.
    pub fn mark_stopped(&self) {
        self.health_state.store(Arc::new(HealthState::Stopped));
    }

    /// Counts one request as in flight until the guard is dropped.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(GATEWAY_ACTIVE_CONNECTIONS).increment(1.0);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for in-flight requests to reach zero.
    ///
    /// Returns `false` on timeout; the state is left unchanged.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter and the active-connections gauge on
/// drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!(GATEWAY_ACTIVE_CONNECTIONS).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);
        assert!(!controller.is_shutting_down());

        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);

        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert!(controller.is_shutting_down());

        controller.mark_stopped();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[test]
    fn repeated_trigger_does_not_regress_state() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();
        controller.mark_stopped();
        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn waiter_after_unobserved_trigger_resolves() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();
        assert!(*controller.shutdown_receiver().borrow());
        tokio::time::timeout(Duration::from_secs(1), controller.wait_for_signal())
            .await
            .unwrap();
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HealthState::Draining).unwrap(), "\"draining\"");
        assert_eq!(HealthState::Ready.as_str(), "ready");
    }

    #[test]
    fn in_flight_guard_counts() {
        let controller = ShutdownController::new();
        let first = controller.in_flight_guard();
        let second = controller.in_flight_guard();
        assert_eq!(controller.in_flight_count(), 2);
        drop(first);
        assert_eq!(controller.in_flight_count(), 1);
        drop(second);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[test]
    fn in_flight_guards_drive_active_connections_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let controller = ShutdownController::new();

        let _held = metrics::with_local_recorder(&recorder, || {
            let first = controller.in_flight_guard();
            let second = controller.in_flight_guard();
            drop(first);
            second
        });

        assert!(handle.render().contains("gateway_active_connections 1"));
    }

    #[tokio::test]
    async fn receivers_and_waiters_observe_trigger() {
        let controller = Arc::new(ShutdownController::new());
        let mut rx = controller.shutdown_receiver();
        assert!(!*rx.borrow());

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_for_signal().await })
        };
        controller.trigger_shutdown();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_guards() {
        let controller = ShutdownController::new();
        let guard = controller.in_flight_guard();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_times_out_with_held_guard() {
        let controller = ShutdownController::new();
        let _guard = controller.in_flight_guard();
        assert!(!controller.wait_for_drain(Duration::from_millis(30)).await);
    }
}
