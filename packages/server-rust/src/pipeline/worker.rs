//! Inference worker: consume requests, classify, publish a result, commit.
//!
//! Every consumed request produces exactly one result on the results topic,
//! `completed` or `failed`, and its offset is committed once after the
//! publish attempt whatever the outcome. A request that fails is never
//! redelivered; callers resubmit. Classification runs on tokio's blocking
//! pool so CPU-heavy engines do not stall the runtime's I/O threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use inferq_core::{
    validate_text, Classification, Classifier, ClassifyError, PredictionRequest, PredictionResult,
    WireFormat, UNKNOWN_REQUEST_ID,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::runner::PollLoop;
use crate::bus::{BusConsumer, BusProducer, BusRecord};
use crate::error::PipelineError;
use crate::observability::{
    record_processing_error, WORKER_INFERENCE_LATENCY, WORKER_INFERENCE_TOTAL,
    WORKER_MESSAGES_CONSUMED, WORKER_RESULTS_PRODUCED,
};

const COMPONENT: &str = "worker";

/// Tunables for [`InferenceWorker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Maximum requests taken per poll.
    pub batch_size: usize,
    pub poll_timeout: Duration,
    pub results_topic: String,
    pub format: WireFormat,
}

/// Summary of one processed request.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub result: PredictionResult,
    /// Set when the result could not be published.
    pub publish_error: Option<String>,
    /// Whether the request offset was committed.
    pub committed: bool,
}

/// Background consumer that turns requests into results.
pub struct InferenceWorker {
    consumer: Box<dyn BusConsumer>,
    producer: Box<dyn BusProducer>,
    classifier: Arc<dyn Classifier>,
    settings: WorkerSettings,
}

impl InferenceWorker {
    #[must_use]
    pub fn new(
        consumer: Box<dyn BusConsumer>,
        producer: Box<dyn BusProducer>,
        classifier: Arc<dyn Classifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            consumer,
            producer,
            classifier,
            settings,
        }
    }

    /// Polls one bounded batch and processes each record in order.
    /// Returns the number of records processed.
    pub async fn process_batch(&mut self) -> Result<usize, PipelineError> {
        let records = self
            .consumer
            .poll(self.settings.batch_size, self.settings.poll_timeout)
            .await?;
        for record in &records {
            self.process(record).await;
        }
        Ok(records.len())
    }

    /// Classifies one request record, publishes its result, and commits it.
    pub async fn process(&mut self, record: &BusRecord) -> WorkerOutcome {
        metrics::counter!(WORKER_MESSAGES_CONSUMED, "topic" => record.topic.clone()).increment(1);

        let result = match self.infer(record).await {
            Ok(result) => {
                metrics::counter!(WORKER_INFERENCE_TOTAL, "status" => "success").increment(1);
                result
            }
            Err((request_id, err)) => {
                metrics::counter!(WORKER_INFERENCE_TOTAL, "status" => "error").increment(1);
                record_processing_error(COMPONENT, err.kind());
                error!(
                    request_id = %request_id,
                    kind = err.kind(),
                    error = %err,
                    "processing error"
                );
                PredictionResult::failed(request_id, self.classifier.engine_id())
            }
        };

        let publish_error = self.publish(&result).await.err().map(|err| {
            record_processing_error(COMPONENT, err.kind());
            error!(request_id = %result.request_id, error = %err, "result produce failed");
            err.to_string()
        });

        // Commit whatever happened above: a request is acknowledged exactly once.
        let committed = match self.consumer.commit(record).await {
            Ok(()) => true,
            Err(err) => {
                let err = PipelineError::from(err);
                record_processing_error(COMPONENT, err.kind());
                warn!(request_id = %result.request_id, error = %err, "request commit failed");
                false
            }
        };

        if publish_error.is_none() {
            info!(
                request_id = %result.request_id,
                label = %result.label,
                score = result.score,
                inference_ms = result.inference_time_ms,
                status = result.status.as_str(),
                "request completed"
            );
        }

        WorkerOutcome {
            result,
            publish_error,
            committed,
        }
    }

    /// Decodes, validates, and classifies. On failure returns the best
    /// identifier that could be recovered alongside the error.
    async fn infer(&self, record: &BusRecord) -> Result<PredictionResult, (String, PipelineError)> {
        let request: PredictionRequest = self
            .settings
            .format
            .decode(&record.payload)
            .map_err(|err| (self.recover_request_id(record), PipelineError::from(err)))?;
        let request_id = request.request_id;

        validate_text(&request.text)
            .map_err(|err| (request_id.clone(), PipelineError::from(err)))?;
        info!(request_id = %request_id, "processing request");

        let classifier = Arc::clone(&self.classifier);
        let text = request.text;
        let start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || classifier.classify(&text)).await;
        let elapsed = start.elapsed();
        metrics::histogram!(WORKER_INFERENCE_LATENCY).record(elapsed.as_secs_f64());

        let classification: Classification = joined
            .map_err(|join| ClassifyError::new(format!("classifier task aborted: {join}")))
            .and_then(|outcome| outcome)
            .map_err(|err| (request_id.clone(), PipelineError::from(err)))?;

        Ok(PredictionResult::completed(
            request_id,
            classification.label,
            classification.score,
            self.classifier.engine_id(),
            round_ms(classification.duration),
        ))
    }

    async fn publish(&self, result: &PredictionResult) -> Result<(), PipelineError> {
        let payload = Bytes::from(self.settings.format.encode(result)?);
        self.producer
            .send(&self.settings.results_topic, &result.request_id, payload)
            .await
            .map_err(|source| PipelineError::Publish {
                topic: self.settings.results_topic.clone(),
                source,
            })?;
        metrics::counter!(WORKER_RESULTS_PRODUCED, "topic" => self.settings.results_topic.clone())
            .increment(1);
        Ok(())
    }
}

/// Just the identifier of a request whose other fields did not decode.
#[derive(Deserialize)]
struct RequestIdOnly {
    request_id: String,
}

impl InferenceWorker {
    /// Identifier for a request that could not be decoded: the payload's
    /// `request_id` if that much is readable, then the record's partition
    /// key, then [`UNKNOWN_REQUEST_ID`].
    fn recover_request_id(&self, record: &BusRecord) -> String {
        self.settings
            .format
            .decode::<RequestIdOnly>(&record.payload)
            .ok()
            .map(|partial| partial.request_id)
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| key_or_placeholder(record))
    }
}

/// The record's partition key when it is non-blank UTF-8, else
/// [`UNKNOWN_REQUEST_ID`].
#[must_use]
pub fn key_or_placeholder(record: &BusRecord) -> String {
    record
        .key_str()
        .filter(|key| !key.trim().is_empty())
        .unwrap_or(UNKNOWN_REQUEST_ID)
        .to_string()
}

/// Milliseconds rounded to two decimal places.
fn round_ms(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[async_trait]
impl PollLoop for InferenceWorker {
    fn name(&self) -> &'static str {
        "inference-worker"
    }

    async fn poll_once(&mut self) {
        if let Err(err) = self.process_batch().await {
            record_processing_error(COMPONENT, err.kind());
            warn!(error = %err, "request poll failed, backing off");
            tokio::time::sleep(self.settings.poll_timeout).await;
        }
    }

    async fn shutdown(&mut self) {
        info!("worker shutting down");
        self.consumer.close().await;
        self.producer.close().await;
    }
}
