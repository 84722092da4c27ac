use std::time::Duration;

/// Output of a single classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Predicted class label (e.g. `POSITIVE`).
    pub label: String,
    /// Confidence in `[0.0, 1.0]`.
    pub score: f64,
    /// Time the engine spent producing this classification.
    pub duration: Duration,
}

/// Failure reported by a classification engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("classification failed: {reason}")]
pub struct ClassifyError {
    pub reason: String,
}

impl ClassifyError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Pluggable text classification engine.
///
/// Calls are synchronous and may be CPU-bound; callers on an async runtime
/// run them on a blocking thread. Implementations are shared across threads
/// behind an `Arc`.
pub trait Classifier: Send + Sync + 'static {
    /// Identifier reported as the engine of every result this classifier produces.
    fn engine_id(&self) -> &str;

    /// Classifies `text` into a label and confidence score.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError`] if the engine cannot classify the input.
    fn classify(&self, text: &str) -> Result<Classification, ClassifyError>;
}
