//! Process-owned pipeline context.
//!
//! Opens every bus handle, builds the cache and submitter, and spawns the
//! ingestor and worker loops. Nothing here is global: the binary creates one
//! context and hands its pieces to the HTTP layer.

use std::sync::Arc;

use inferq_core::Classifier;
use tracing::info;

use crate::bus::{connect_consumer, connect_producer, BusConnector, BusProducer};
use crate::cache::ResultCache;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::network::ShutdownController;
use crate::pipeline::{BackgroundLoop, InferenceWorker, RequestSubmitter, ResultIngestor};

/// Running pipeline: shared handles plus the background loops.
pub struct PipelineContext {
    cache: Arc<ResultCache>,
    producer: Arc<dyn BusProducer>,
    submitter: Arc<RequestSubmitter>,
    shutdown: Arc<ShutdownController>,
    loops: Vec<BackgroundLoop>,
}

impl PipelineContext {
    /// Connects to the bus and starts the background loops, then marks the
    /// service ready.
    ///
    /// Handles are opened in order: submission producer, results consumer,
    /// requests consumer, worker producer. Each gets the full retry budget.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Cache`] for a zero cache capacity.
    /// - [`PipelineError::Connection`] when any handle exhausts its retries.
    pub async fn start(
        config: &PipelineConfig,
        connector: &dyn BusConnector,
        classifier: Arc<dyn Classifier>,
        shutdown: Arc<ShutdownController>,
    ) -> Result<Self, PipelineError> {
        let policy = config.retry_policy();
        let address = config.bus_address.as_str();
        let cache = Arc::new(ResultCache::new(config.cache_capacity)?);

        let producer: Arc<dyn BusProducer> =
            Arc::from(connect_producer(connector, address, policy).await?);
        let submitter = Arc::new(RequestSubmitter::new(
            Arc::clone(&producer),
            config.requests_topic.clone(),
            config.wire_format,
        ));

        let results_consumer = connect_consumer(
            connector,
            address,
            &config.results_topic,
            &config.ingestor_group,
            policy,
        )
        .await?;
        let ingestor = ResultIngestor::new(
            results_consumer,
            Arc::clone(&cache),
            config.ingestor_settings(),
        );

        let requests_consumer = connect_consumer(
            connector,
            address,
            &config.requests_topic,
            &config.worker_group,
            policy,
        )
        .await?;
        let worker_producer = connect_producer(connector, address, policy).await?;
        let worker = InferenceWorker::new(
            requests_consumer,
            worker_producer,
            Arc::clone(&classifier),
            config.worker_settings(),
        );

        let loops = vec![
            BackgroundLoop::spawn(ingestor, shutdown.shutdown_receiver()),
            BackgroundLoop::spawn(worker, shutdown.shutdown_receiver()),
        ];

        shutdown.set_ready();
        info!(
            bus = address,
            requests_topic = %config.requests_topic,
            results_topic = %config.results_topic,
            engine = classifier.engine_id(),
            cache_capacity = config.cache_capacity,
            "pipeline started"
        );

        Ok(Self {
            cache,
            producer,
            submitter,
            shutdown,
            loops,
        })
    }

    #[must_use]
    pub fn cache(&self) -> Arc<ResultCache> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn submitter(&self) -> Arc<RequestSubmitter> {
        Arc::clone(&self.submitter)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Whether the submission producer is connected.
    #[must_use]
    pub fn bus_connected(&self) -> bool {
        self.producer.is_connected()
    }

    /// Signals the loops, waits for each to release its handles, then closes
    /// the submission producer.
    pub async fn shutdown(mut self) {
        self.shutdown.trigger_shutdown();
        for background in &mut self.loops {
            background.join().await;
        }
        self.producer.close().await;
        self.shutdown.mark_stopped();
        info!("pipeline stopped");
    }
}
