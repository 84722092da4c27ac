//! Request submission: validate, assign an identifier, publish once.

use std::sync::Arc;

use bytes::Bytes;
use inferq_core::{validate_request_id, validate_text, PredictionRequest, WireFormat};
use tracing::{error, info};

use crate::bus::BusProducer;
use crate::error::PipelineError;
use crate::observability::{GATEWAY_MESSAGES_PRODUCED, GATEWAY_PRODUCE_ERRORS};

/// Publishes validated requests to the requests topic.
///
/// Each call makes exactly one publish attempt. A failed publish is returned
/// to the caller as [`PipelineError::Publish`]; resubmitting is safe because
/// the identifier is either caller-chosen or freshly generated.
pub struct RequestSubmitter {
    producer: Arc<dyn BusProducer>,
    topic: String,
    format: WireFormat,
}

impl RequestSubmitter {
    #[must_use]
    pub fn new(producer: Arc<dyn BusProducer>, topic: impl Into<String>, format: WireFormat) -> Self {
        Self {
            producer,
            topic: topic.into(),
            format,
        }
    }

    /// Whether the underlying producer is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.producer.is_connected()
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Validates `text`, assigns an identifier when `request_id` is `None`,
    /// and publishes the request keyed by that identifier.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for empty or oversized text, or a
    ///   blank supplied identifier; nothing is published.
    /// - [`PipelineError::Publish`] when the bus rejects the single attempt.
    pub async fn submit(
        &self,
        text: String,
        request_id: Option<String>,
    ) -> Result<String, PipelineError> {
        validate_text(&text)?;
        let request_id = match request_id {
            Some(id) => {
                validate_request_id(&id)?;
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let request = PredictionRequest::new(request_id, text);
        let payload = Bytes::from(self.format.encode(&request)?);

        match self.producer.send(&self.topic, &request.request_id, payload).await {
            Ok(position) => {
                metrics::counter!(GATEWAY_MESSAGES_PRODUCED, "topic" => self.topic.clone())
                    .increment(1);
                info!(
                    request_id = %request.request_id,
                    partition = position.partition,
                    offset = position.offset,
                    "prediction submitted"
                );
                Ok(request.request_id)
            }
            Err(source) => {
                metrics::counter!(GATEWAY_PRODUCE_ERRORS, "topic" => self.topic.clone())
                    .increment(1);
                error!(request_id = %request.request_id, error = %source, "produce failed");
                Err(PipelineError::Publish {
                    topic: self.topic.clone(),
                    source,
                })
            }
        }
    }
}
