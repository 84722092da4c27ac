//! Process configuration: command-line flags with `INFERQ_*` environment fallbacks.

use std::time::Duration;

use clap::Parser;
use inferq_core::{WireFormat, DEFAULT_PARTITION_COUNT, TOPIC_PREDICTION_REQUESTS, TOPIC_PREDICTION_RESULTS};

use crate::bus::RetryPolicy;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::classifier::{ClassifierKind, ClassifierSettings, DEFAULT_MAX_TOKENS, POSITIVE};
use crate::network::NetworkConfig;
use crate::observability::LogFormat;
use crate::pipeline::{IngestorSettings, WorkerSettings};

pub const DEFAULT_SERVICE_NAME: &str = "inferq";
pub const DEFAULT_BUS_ADDRESS: &str = "memory://local";
pub const DEFAULT_WORKER_GROUP: &str = "ml-worker-group";
pub const DEFAULT_INGESTOR_GROUP: &str = "gateway-results-consumer";

/// Everything the `inferq` binary can be told.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "inferq", version, about = "Asynchronous text classification over a message bus")]
pub struct PipelineConfig {
    /// Name reported by the health endpoint.
    #[arg(long, env = "INFERQ_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    #[arg(long, env = "INFERQ_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "INFERQ_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "INFERQ_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Comma-separated allowed CORS origins; `*` allows any.
    #[arg(long, env = "INFERQ_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "INFERQ_BUS_ADDRESS", default_value = DEFAULT_BUS_ADDRESS)]
    pub bus_address: String,

    #[arg(long, env = "INFERQ_PARTITIONS", default_value_t = DEFAULT_PARTITION_COUNT)]
    pub partitions: u32,

    #[arg(long, env = "INFERQ_REQUESTS_TOPIC", default_value = TOPIC_PREDICTION_REQUESTS)]
    pub requests_topic: String,

    #[arg(long, env = "INFERQ_RESULTS_TOPIC", default_value = TOPIC_PREDICTION_RESULTS)]
    pub results_topic: String,

    #[arg(long, env = "INFERQ_WORKER_GROUP", default_value = DEFAULT_WORKER_GROUP)]
    pub worker_group: String,

    #[arg(long, env = "INFERQ_INGESTOR_GROUP", default_value = DEFAULT_INGESTOR_GROUP)]
    pub ingestor_group: String,

    /// Connection attempts per bus handle before giving up.
    #[arg(long, env = "INFERQ_MAX_RETRIES", default_value_t = 10)]
    pub max_retries: u32,

    /// Seconds to wait between connection attempts.
    #[arg(long, env = "INFERQ_RETRY_DELAY_SECS", default_value_t = 3)]
    pub retry_delay_secs: u64,

    /// Maximum records taken per poll.
    #[arg(long, env = "INFERQ_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    #[arg(long, env = "INFERQ_POLL_TIMEOUT_MS", default_value_t = 1000)]
    pub poll_timeout_ms: u64,

    #[arg(long, env = "INFERQ_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Bus payload encoding: `json` or `msgpack`.
    #[arg(long, env = "INFERQ_WIRE_FORMAT", default_value = "json")]
    pub wire_format: WireFormat,

    /// Classification engine: `lexicon` or `constant`.
    #[arg(long, env = "INFERQ_CLASSIFIER", default_value = "lexicon")]
    pub classifier: ClassifierKind,

    #[arg(long, env = "INFERQ_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: usize,

    #[arg(long, env = "INFERQ_CONSTANT_LABEL", default_value = POSITIVE)]
    pub constant_label: String,

    #[arg(long, env = "INFERQ_CONSTANT_SCORE", default_value_t = 1.0)]
    pub constant_score: f64,

    /// Default filter when `RUST_LOG` is unset.
    #[arg(long, env = "INFERQ_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// `json` or `pretty`.
    #[arg(long, env = "INFERQ_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
            bus_address: DEFAULT_BUS_ADDRESS.to_string(),
            partitions: DEFAULT_PARTITION_COUNT,
            requests_topic: TOPIC_PREDICTION_REQUESTS.to_string(),
            results_topic: TOPIC_PREDICTION_RESULTS.to_string(),
            worker_group: DEFAULT_WORKER_GROUP.to_string(),
            ingestor_group: DEFAULT_INGESTOR_GROUP.to_string(),
            max_retries: 10,
            retry_delay_secs: 3,
            batch_size: 10,
            poll_timeout_ms: 1000,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            wire_format: WireFormat::Json,
            classifier: ClassifierKind::Lexicon,
            max_tokens: DEFAULT_MAX_TOKENS,
            constant_label: POSITIVE.to_string(),
            constant_score: 1.0,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub fn ingestor_settings(&self) -> IngestorSettings {
        IngestorSettings {
            batch_size: self.batch_size.max(1),
            poll_timeout: self.poll_timeout(),
            format: self.wire_format,
        }
    }

    #[must_use]
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.batch_size.max(1),
            poll_timeout: self.poll_timeout(),
            results_topic: self.results_topic.clone(),
            format: self.wire_format,
        }
    }

    #[must_use]
    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            kind: self.classifier,
            max_tokens: self.max_tokens,
            constant_label: self.constant_label.clone(),
            constant_score: self.constant_score,
        }
    }

    #[must_use]
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
