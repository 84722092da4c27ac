//! Message bus seam: producer, consumer, and connector traits.
//!
//! The pipeline talks to the bus only through these traits. A bus provides
//! topics, partition-key routing, consumer groups, and offset commits;
//! [`memory::MemoryBroker`] is the in-process implementation used by the
//! binary and by tests.

pub mod bootstrap;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use bootstrap::{connect_consumer, connect_producer, connect_with_retry, HandleKind, RetryPolicy};
pub use memory::MemoryBroker;

/// A record delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Partition key the record was produced with.
    pub key: Option<Bytes>,
    pub payload: Bytes,
}

impl BusRecord {
    /// Partition key as UTF-8, if present and valid.
    #[must_use]
    pub fn key_str(&self) -> Option<&str> {
        self.key
            .as_deref()
            .and_then(|k| std::str::from_utf8(k).ok())
    }
}

/// Where a produced record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    pub partition: u32,
    pub offset: u64,
}

/// Errors reported by bus handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("no bus listening at {address}")]
    Unreachable { address: String },
    #[error("handle already closed")]
    Closed,
    #[error("record from topic {got} cannot be committed by a consumer of {expected}")]
    ForeignRecord { expected: String, got: String },
}

/// Publishing handle. Shared by reference; `send` takes `&self`.
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Publishes `payload` to `topic`, routed by `key`, and waits for the
    /// bus to acknowledge it.
    async fn send(&self, topic: &str, key: &str, payload: Bytes) -> Result<RecordPosition, BusError>;

    /// Whether the handle currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Releases the connection. Later sends fail with [`BusError::Closed`].
    async fn close(&self);
}

/// Consuming handle bound to one topic and one consumer group.
///
/// Owned exclusively by the task that created it. `Sync` so a loop can hold
/// `&self` across an await while it owns the handle.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    fn topic(&self) -> &str;

    fn group(&self) -> &str;

    /// Waits up to `timeout` for records and returns at most `max_records`.
    /// An empty batch means the timeout elapsed with nothing to deliver.
    async fn poll(&mut self, max_records: usize, timeout: Duration)
        -> Result<Vec<BusRecord>, BusError>;

    /// Commits `record` for this consumer group, so a restarted consumer in
    /// the same group resumes after it.
    async fn commit(&mut self, record: &BusRecord) -> Result<(), BusError>;

    /// Releases the consumer. Uncommitted records stay on the bus.
    async fn close(&mut self);
}

/// Opens producer and consumer handles against a bus address.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect_producer(&self, address: &str) -> Result<Box<dyn BusProducer>, BusError>;

    async fn connect_consumer(
        &self,
        address: &str,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn BusConsumer>, BusError>;
}
