//! Request/result pipeline: submission, inference, and result ingestion.

pub mod ingestor;
pub mod runner;
pub mod submitter;
pub mod worker;

pub use ingestor::{IngestOutcome, IngestorSettings, ResultIngestor};
pub use runner::{BackgroundLoop, PollLoop};
pub use submitter::RequestSubmitter;
pub use worker::{InferenceWorker, WorkerOutcome, WorkerSettings};
