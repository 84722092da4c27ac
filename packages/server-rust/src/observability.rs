//! Logging and metrics setup.
//!
//! Metric names live here so every instrumentation point and the exporter
//! agree on them. Recording goes through the `metrics` facade macros; until
//! [`install_prometheus`] runs (tests never call it) those macros are no-ops.

use std::str::FromStr;

use anyhow::Context as _;
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const HTTP_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const HTTP_REQUEST_LATENCY: &str = "gateway_request_latency_seconds";
pub const GATEWAY_ACTIVE_CONNECTIONS: &str = "gateway_active_connections";
pub const GATEWAY_MESSAGES_PRODUCED: &str = "gateway_messages_produced_total";
pub const GATEWAY_PRODUCE_ERRORS: &str = "gateway_produce_errors_total";
pub const GATEWAY_RESULTS_RECEIVED: &str = "gateway_results_received_total";
pub const GATEWAY_CACHE_ENTRIES: &str = "gateway_cache_entries";
pub const WORKER_MESSAGES_CONSUMED: &str = "worker_messages_consumed_total";
pub const WORKER_INFERENCE_TOTAL: &str = "worker_inference_total";
pub const WORKER_INFERENCE_LATENCY: &str = "worker_inference_latency_seconds";
pub const WORKER_RESULTS_PRODUCED: &str = "worker_results_produced_total";
pub const WORKER_MODEL_LOAD_TIME: &str = "worker_model_load_time_seconds";
pub const PROCESSING_ERRORS: &str = "pipeline_processing_errors_total";

const HTTP_LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const INFERENCE_LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local runs.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
///
/// # Errors
///
/// Returns an error if `default_level` is not a valid filter directive or a
/// global subscriber is already installed.
pub fn init_tracing(default_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level: {default_level}"))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

/// Installs the Prometheus recorder and registers metric descriptions.
///
/// The returned handle renders the exposition text for `/metrics`.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_LATENCY.to_string()),
            HTTP_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(WORKER_INFERENCE_LATENCY.to_string()),
            INFERENCE_LATENCY_BUCKETS,
        )?
        .install_recorder()
        .context("failed to install prometheus recorder")?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests received");
    describe_histogram!(HTTP_REQUEST_LATENCY, Unit::Seconds, "HTTP request latency");
    describe_gauge!(GATEWAY_ACTIVE_CONNECTIONS, "HTTP requests currently being served");
    describe_counter!(GATEWAY_MESSAGES_PRODUCED, "Requests published to the bus");
    describe_counter!(GATEWAY_PRODUCE_ERRORS, "Failed request publishes");
    describe_counter!(GATEWAY_RESULTS_RECEIVED, "Results consumed from the bus");
    describe_gauge!(GATEWAY_CACHE_ENTRIES, "Results currently held in the cache");
    describe_counter!(WORKER_MESSAGES_CONSUMED, "Requests consumed by the worker");
    describe_counter!(WORKER_INFERENCE_TOTAL, "Classifications attempted, by outcome");
    describe_histogram!(WORKER_INFERENCE_LATENCY, Unit::Seconds, "Classification latency");
    describe_counter!(WORKER_RESULTS_PRODUCED, "Results published by the worker");
    describe_gauge!(WORKER_MODEL_LOAD_TIME, Unit::Seconds, "Time taken to build the classifier");
    describe_counter!(PROCESSING_ERRORS, "Per-message processing errors, by component and kind");
}

/// Counts a contained per-message error.
pub fn record_processing_error(component: &'static str, kind: &'static str) {
    metrics::counter!(PROCESSING_ERRORS, "component" => component, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_processing_error("worker", "decode");
        metrics::histogram!(WORKER_INFERENCE_LATENCY).record(0.01);
    }

    #[test]
    fn latency_buckets_are_sorted() {
        for buckets in [HTTP_LATENCY_BUCKETS, INFERENCE_LATENCY_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
