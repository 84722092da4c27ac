//! Error taxonomy for the pipeline.
//!
//! Per-message errors (`Decode`, `Classification`, `Bus`, `Cache`) are
//! contained by the loop that hit them. `Validation` and `Publish` surface to
//! the submitting caller. `Connection` is the only error that is fatal, and
//! only at startup.

use inferq_core::{ClassifyError, CodecError, ValidationError};

use crate::bus::BusError;
use crate::cache::CacheError;

/// Errors produced anywhere in the request/result pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not connect {kind} to {target} after {attempts} attempts: {source}")]
    Connection {
        kind: &'static str,
        target: String,
        attempts: u32,
        #[source]
        source: BusError,
    },
    #[error("failed to publish to {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BusError,
    },
    #[error("malformed message: {0}")]
    Decode(#[from] CodecError),
    #[error(transparent)]
    Classification(#[from] ClassifyError),
    #[error("cache update failed: {0}")]
    Cache(#[from] CacheError),
    #[error("bus operation failed: {0}")]
    Bus(#[from] BusError),
}

impl PipelineError {
    /// Stable short name for this error, used as a metric label and log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Connection { .. } => "connection",
            Self::Publish { .. } => "publish",
            Self::Decode(_) => "decode",
            Self::Classification(_) => "classification",
            Self::Cache(_) => "cache",
            Self::Bus(_) => "bus",
        }
    }
}

#[cfg(test)]
mod tests {
    use inferq_core::WireFormat;

    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            PipelineError::Validation(ValidationError::EmptyText).kind(),
            "validation"
        );
        assert_eq!(
            PipelineError::Classification(ClassifyError::new("boom")).kind(),
            "classification"
        );
        assert_eq!(
            PipelineError::Publish {
                topic: "t".to_string(),
                source: BusError::Unavailable("down".to_string()),
            }
            .kind(),
            "publish"
        );
    }

    #[test]
    fn decode_error_converts_from_codec() {
        let codec = CodecError::Decode {
            format: WireFormat::Json,
            reason: "eof".to_string(),
        };
        let err: PipelineError = codec.into();
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("eof"));
    }

    #[test]
    fn connection_error_reports_attempts() {
        let err = PipelineError::Connection {
            kind: "producer",
            target: "memory://local".to_string(),
            attempts: 3,
            source: BusError::Unavailable("refused".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("producer"));
        assert!(msg.contains("3 attempts"));
    }
}
