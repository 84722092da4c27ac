//! Connect-with-retry for bus handles.
//!
//! Startup races the bus: the broker may not be accepting connections yet
//! when the process boots. Every handle is therefore opened through
//! [`connect_with_retry`], which retries on a fixed delay and gives up with
//! [`PipelineError::Connection`] after `max_retries` attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use super::{BusConnector, BusConsumer, BusError, BusProducer};
use crate::error::PipelineError;

/// Fixed-delay retry budget for opening a bus handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up. 0 is treated as 1.
    pub max_retries: u32,
    /// Pause between consecutive attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Kind of handle being opened, for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Producer,
    Consumer,
}

impl HandleKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs `connect` until it succeeds or `policy.max_retries` attempts fail.
///
/// Sleeps `policy.retry_delay` between attempts; there is no sleep after
/// the final failure.
///
/// # Errors
///
/// Returns [`PipelineError::Connection`] carrying the last [`BusError`] once
/// the attempt budget is exhausted.
pub async fn connect_with_retry<T, F, Fut>(
    kind: HandleKind,
    target: &str,
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BusError>>,
{
    let max_retries = policy.max_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect().await {
            Ok(handle) => {
                info!(kind = kind.as_str(), target, attempt, "bus handle connected");
                return Ok(handle);
            }
            Err(source) => {
                warn!(
                    kind = kind.as_str(),
                    target,
                    attempt,
                    max_retries,
                    error = %source,
                    "bus connect failed"
                );
                if attempt >= max_retries {
                    return Err(PipelineError::Connection {
                        kind: kind.as_str(),
                        target: target.to_string(),
                        attempts: attempt,
                        source,
                    });
                }
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
    }
}

/// Opens a producer against `address`, retrying per `policy`.
///
/// # Errors
///
/// Returns [`PipelineError::Connection`] when every attempt fails.
pub async fn connect_producer(
    connector: &dyn BusConnector,
    address: &str,
    policy: RetryPolicy,
) -> Result<Box<dyn BusProducer>, PipelineError> {
    connect_with_retry(HandleKind::Producer, address, policy, || {
        connector.connect_producer(address)
    })
    .await
}

/// Opens a consumer on `topic` for `group`, retrying per `policy`.
///
/// # Errors
///
/// Returns [`PipelineError::Connection`] when every attempt fails.
pub async fn connect_consumer(
    connector: &dyn BusConnector,
    address: &str,
    topic: &str,
    group: &str,
    policy: RetryPolicy,
) -> Result<Box<dyn BusConsumer>, PipelineError> {
    let target = format!("{address}/{topic}?group={group}");
    connect_with_retry(HandleKind::Consumer, &target, policy, || {
        connector.connect_consumer(address, topic, group)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::bus::MemoryBroker;

    /// Fails the first `failures` calls, then succeeds.
    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<u32, BusError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(BusError::Unavailable(format!("attempt {n}"))))
            } else {
                std::future::ready(Ok(n))
            }
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let handle = connect_with_retry(HandleKind::Producer, "bus", policy(5), flaky(3, calls.clone()))
            .await
            .unwrap();

        assert_eq!(handle, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Three failures, three fixed delays.
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn last_allowed_attempt_can_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle = connect_with_retry(HandleKind::Consumer, "bus", policy(4), flaky(3, calls.clone()))
            .await
            .unwrap();
        assert_eq!(handle, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let err = connect_with_retry(HandleKind::Producer, "bus", policy(3), flaky(10, calls.clone()))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PipelineError::Connection { kind, attempts, source, .. } => {
                assert_eq!(kind, "producer");
                assert_eq!(attempts, 3);
                assert_eq!(source, BusError::Unavailable("attempt 3".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No sleep after the final failure.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = connect_with_retry(HandleKind::Producer, "bus", policy(0), flaky(1, calls.clone())).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn producer_connects_once_broker_comes_up() {
        let broker = MemoryBroker::new("memory://boot", 2);
        broker.set_available(false);

        let toggler = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            toggler.set_available(true);
        });

        let producer = connect_producer(&broker, "memory://boot", policy(5)).await.unwrap();
        assert!(producer.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_fails_against_wrong_address() {
        let broker = MemoryBroker::new("memory://boot", 2);
        let err = connect_consumer(&broker, "memory://nowhere", "t", "g", policy(2))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "connection");
        assert!(err.to_string().contains("memory://nowhere/t?group=g"));
    }
}
