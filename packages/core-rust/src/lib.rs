//! `inferq` Core: wire messages, input validation, codecs, and partition hashing.

pub mod codec;
pub mod hash;
pub mod messages;
pub mod partition;
pub mod traits;
pub mod validation;

pub use codec::{CodecError, WireFormat};
pub use messages::{
    PredictionRequest, PredictionResult, TaskStatus, FAILED_LABEL, TOPIC_PREDICTION_REQUESTS,
    TOPIC_PREDICTION_RESULTS, UNKNOWN_REQUEST_ID,
};
pub use partition::{partition_for_key, DEFAULT_PARTITION_COUNT};
pub use traits::{Classification, Classifier, ClassifyError};
pub use validation::{validate_request_id, validate_text, ValidationError, MAX_TEXT_CHARS};
