//! `inferq` Server: bus bootstrap, result cache, inference worker, and HTTP gateway.

pub mod bus;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod network;
pub mod observability;
pub mod pipeline;

pub use cache::ResultCache;
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
