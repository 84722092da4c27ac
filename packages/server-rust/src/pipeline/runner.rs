//! Cancellable background poll loop.
//!
//! Provides a generic `BackgroundLoop` that repeatedly drives a `PollLoop`
//! implementation on its own tokio task until a shutdown signal arrives.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// PollLoop trait
// ---------------------------------------------------------------------------

/// One iteration of a long-running consume loop.
///
/// `poll_once` is cancelled at its next await point when shutdown is
/// signalled, so it must not rely on running to completion.
#[async_trait]
pub trait PollLoop: Send + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Polls the bus once and processes whatever arrived.
    async fn poll_once(&mut self);

    /// Called once after the loop exits; releases bus handles.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundLoop
// ---------------------------------------------------------------------------

/// Handle to a spawned [`PollLoop`].
///
/// The spawned task:
/// 1. Exits immediately if shutdown was already signalled
/// 2. Otherwise calls `PollLoop::poll_once()` in a loop, racing each call
///    against the shutdown signal
/// 3. Calls `PollLoop::shutdown()` once on exit
pub struct BackgroundLoop {
    name: &'static str,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl BackgroundLoop {
    /// Spawns `runnable` on the current runtime.
    ///
    /// The loop stops when `shutdown` turns `true` or its sender is dropped.
    pub fn spawn<R: PollLoop>(mut runnable: R, mut shutdown: watch::Receiver<bool>) -> Self {
        let name = runnable.name();
        let handle = tokio::spawn(async move {
            info!(task = name, "background loop started");
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break; // Sender dropped.
                        }
                    }
                    () = runnable.poll_once() => {}
                }
            }
            debug!(task = name, "background loop releasing resources");
            runnable.shutdown().await;
            info!(task = name, "background loop stopped");
        });

        Self {
            name,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the spawned task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, tokio::task::JoinHandle::is_finished)
    }

    /// Waits for the loop to exit. The shutdown signal must be sent first.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(task = self.name, error = %err, "background loop panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
