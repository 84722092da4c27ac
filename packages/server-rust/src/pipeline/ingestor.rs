//! Result ingestion: consume results, upsert into the cache, commit.
//!
//! A record's offset is committed only after its result is in the cache. A
//! record that fails to decode is skipped without a commit, so it replays
//! after a restart; replay is harmless because the cache write is an upsert.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inferq_core::{PredictionResult, WireFormat};
use tracing::{debug, info, warn};

use super::runner::PollLoop;
use crate::bus::{BusConsumer, BusRecord};
use crate::cache::ResultCache;
use crate::error::PipelineError;
use crate::observability::{record_processing_error, GATEWAY_CACHE_ENTRIES, GATEWAY_RESULTS_RECEIVED};

const COMPONENT: &str = "ingestor";

/// Tunables for [`ResultIngestor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestorSettings {
    pub batch_size: usize,
    pub poll_timeout: Duration,
    pub format: WireFormat,
}

/// What happened to a single result record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Cached and committed.
    Stored { request_id: String },
    /// Cached, but the commit failed; the record may replay.
    StoredUncommitted { request_id: String },
    /// Not cached and not committed.
    Skipped { kind: &'static str },
}

/// Background consumer that feeds the [`ResultCache`].
pub struct ResultIngestor {
    consumer: Box<dyn BusConsumer>,
    cache: Arc<ResultCache>,
    settings: IngestorSettings,
}

impl ResultIngestor {
    #[must_use]
    pub fn new(
        consumer: Box<dyn BusConsumer>,
        cache: Arc<ResultCache>,
        settings: IngestorSettings,
    ) -> Self {
        Self {
            consumer,
            cache,
            settings,
        }
    }

    /// Decodes one record, stores it, and commits its offset.
    pub async fn ingest(&mut self, record: &BusRecord) -> IngestOutcome {
        let result: PredictionResult = match self.settings.format.decode(&record.payload) {
            Ok(result) => result,
            Err(err) => {
                let err = PipelineError::from(err);
                record_processing_error(COMPONENT, err.kind());
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "result processing error"
                );
                return IngestOutcome::Skipped { kind: err.kind() };
            }
        };

        let request_id = result.request_id.clone();
        let status = result.status;
        let label = result.label.clone();
        let score = result.score;

        if let Some(evicted) = self.cache.put(request_id.clone(), result) {
            debug!(evicted = %evicted, "result evicted from cache");
        }
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(GATEWAY_CACHE_ENTRIES).set(self.cache.size() as f64);
        metrics::counter!(GATEWAY_RESULTS_RECEIVED, "status" => status.as_str()).increment(1);

        if let Err(err) = self.consumer.commit(record).await {
            let err = PipelineError::from(err);
            record_processing_error(COMPONENT, err.kind());
            warn!(request_id = %request_id, error = %err, "result commit failed");
            return IngestOutcome::StoredUncommitted { request_id };
        }

        info!(request_id = %request_id, label = %label, score, status = status.as_str(), "result received");
        IngestOutcome::Stored { request_id }
    }
}

#[async_trait]
impl PollLoop for ResultIngestor {
    fn name(&self) -> &'static str {
        "result-ingestor"
    }

    async fn poll_once(&mut self) {
        match self
            .consumer
            .poll(self.settings.batch_size, self.settings.poll_timeout)
            .await
        {
            Ok(records) => {
                for record in &records {
                    self.ingest(record).await;
                }
            }
            Err(err) => {
                let err = PipelineError::from(err);
                record_processing_error(COMPONENT, err.kind());
                warn!(error = %err, "result poll failed, backing off");
                tokio::time::sleep(self.settings.poll_timeout).await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.consumer.close().await;
        info!(topic = self.consumer.topic(), group = self.consumer.group(), "results consumer closed");
    }
}
