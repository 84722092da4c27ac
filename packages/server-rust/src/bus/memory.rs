//! In-process bus backed by per-partition logs.
//!
//! Topics are created on first use with a fixed partition count. Records are
//! routed with [`partition_for_key`], so order is preserved per key. Consumer
//! groups keep committed offsets in a [`DashMap`]; a consumer starts from its
//! group's committed offsets, or from the earliest retained record when the
//! group has never committed. Every consumer reads all partitions of its topic
//! (no rebalancing between members of a group).
//!
//! A record is released once every group that has joined its topic has
//! committed past it. Offsets never shift: a partition remembers the offset
//! of its first retained record.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use inferq_core::partition_for_key;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{BusConnector, BusConsumer, BusError, BusProducer, BusRecord, RecordPosition};

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Bytes>,
    payload: Bytes,
}

#[derive(Debug, Default)]
struct PartitionLog {
    /// Offset of the first retained record.
    base: u64,
    records: VecDeque<StoredRecord>,
}

impl PartitionLog {
    fn end(&self) -> u64 {
        self.base + self.records.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&StoredRecord> {
        let index = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.records.get(index)
    }

    /// Drops records below `floor`; returns how many were released.
    fn release_before(&mut self, floor: u64) -> usize {
        let mut released = 0;
        while self.base < floor && self.records.pop_front().is_some() {
            self.base += 1;
            released += 1;
        }
        released
    }
}

#[derive(Debug)]
struct TopicLog {
    name: String,
    partitions: Vec<RwLock<PartitionLog>>,
    appended: Notify,
}

impl TopicLog {
    fn new(name: &str, partition_count: u32) -> Self {
        Self {
            name: name.to_string(),
            partitions: (0..partition_count.max(1))
                .map(|_| RwLock::new(PartitionLog::default()))
                .collect(),
            appended: Notify::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn append(&self, key: &str, payload: Bytes) -> RecordPosition {
        let partition = partition_for_key(key.as_bytes(), self.partition_count());
        let offset = {
            let mut log = self.partitions[partition as usize].write();
            let offset = log.end();
            log.records.push_back(StoredRecord {
                key: Some(Bytes::copy_from_slice(key.as_bytes())),
                payload,
            });
            offset
        };
        self.appended.notify_waiters();
        RecordPosition { partition, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupPartition {
    group: String,
    topic: String,
    partition: u32,
}

#[derive(Debug)]
struct BrokerInner {
    address: String,
    partition_count: u32,
    available: AtomicBool,
    topics: DashMap<String, Arc<TopicLog>>,
    committed: DashMap<GroupPartition, u64>,
    /// Groups that have joined each topic.
    subscriptions: DashMap<String, Vec<String>>,
}

impl BrokerInner {
    fn topic(&self, name: &str) -> Arc<TopicLog> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(name, self.partition_count)))
            .clone()
    }

    fn ensure_available(&self) -> Result<(), BusError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BusError::Unavailable(format!("{} is not accepting requests", self.address)))
        }
    }

    fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.committed
            .get(&GroupPartition {
                group: group.to_string(),
                topic: topic.to_string(),
                partition,
            })
            .map(|entry| *entry.value())
    }

    fn subscribe(&self, topic: &str, group: &str) {
        let mut groups = self.subscriptions.entry(topic.to_string()).or_default();
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
    }

    /// Releases records on `partition` that every joined group has committed.
    fn release_committed(&self, log: &TopicLog, partition: u32) {
        let floor = match self.subscriptions.get(&log.name) {
            Some(groups) => groups
                .iter()
                .map(|group| self.committed_offset(group, &log.name, partition).unwrap_or(0))
                .min(),
            None => None,
        };
        let Some(floor) = floor else { return };
        let released = log.partitions[partition as usize].write().release_before(floor);
        if released > 0 {
            trace!(topic = %log.name, partition, released, "released committed records");
        }
    }
}

/// In-process message bus. Cloning yields another handle to the same broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Creates a broker reachable at `address` whose topics have
    /// `partition_count` partitions.
    #[must_use]
    pub fn new(address: impl Into<String>, partition_count: u32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                address: address.into(),
                partition_count: partition_count.max(1),
                available: AtomicBool::new(true),
                topics: DashMap::new(),
                committed: DashMap::new(),
                subscriptions: DashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    fn check_address(&self, address: &str) -> Result<(), BusError> {
        if address != self.inner.address {
            return Err(BusError::Unreachable {
                address: address.to_string(),
            });
        }
        self.inner.ensure_available()
    }
}

/// Inspection and fault-injection hooks for tests across the crate.
#[cfg(test)]
impl MemoryBroker {
    /// Marks the broker up or down. While down, connects, sends, polls and
    /// commits all fail with [`BusError::Unavailable`].
    pub(crate) fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Appends a raw record, bypassing any producer handle.
    pub(crate) fn publish_raw(
        &self,
        topic: &str,
        key: &str,
        payload: impl Into<Bytes>,
    ) -> RecordPosition {
        self.inner.topic(topic).append(key, payload.into())
    }

    /// Snapshot of every retained record in `topic`, partition by partition.
    pub(crate) fn records(&self, topic: &str) -> Vec<BusRecord> {
        let log = self.inner.topic(topic);
        let mut out = Vec::new();
        for (partition, part) in log.partitions.iter().enumerate() {
            let part = part.read();
            for (offset, stored) in (part.base..).zip(part.records.iter()) {
                out.push(to_bus_record(&log.name, partition, offset, stored));
            }
        }
        out
    }

    /// Committed offset (next offset to read) for a group on one partition.
    pub(crate) fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.inner.committed_offset(group, topic, partition)
    }

    /// Number of records `group` has not yet committed on `topic`.
    pub(crate) fn lag(&self, group: &str, topic: &str) -> u64 {
        let log = self.inner.topic(topic);
        (0..log.partition_count())
            .map(|p| {
                let part = log.partitions[p as usize].read();
                let committed = self.committed_offset(group, topic, p).unwrap_or(part.base);
                part.end().saturating_sub(committed)
            })
            .sum()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_bus_record(topic: &str, partition: usize, offset: u64, stored: &StoredRecord) -> BusRecord {
    BusRecord {
        topic: topic.to_string(),
        partition: partition as u32,
        offset,
        key: stored.key.clone(),
        payload: stored.payload.clone(),
    }
}

#[async_trait]
impl BusConnector for MemoryBroker {
    async fn connect_producer(&self, address: &str) -> Result<Box<dyn BusProducer>, BusError> {
        self.check_address(address)?;
        Ok(Box::new(MemoryProducer {
            broker: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_consumer(
        &self,
        address: &str,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn BusConsumer>, BusError> {
        self.check_address(address)?;
        let log = self.inner.topic(topic);
        self.inner.subscribe(topic, group);
        let positions = (0..log.partition_count())
            .map(|p| self.inner.committed_offset(group, topic, p).unwrap_or(0))
            .collect();
        debug!(topic, group, "memory consumer joined");
        Ok(Box::new(MemoryConsumer {
            broker: Arc::clone(&self.inner),
            log,
            group: group.to_string(),
            positions,
            next_partition: 0,
            closed: false,
        }))
    }
}

struct MemoryProducer {
    broker: Arc<BrokerInner>,
    closed: AtomicBool,
}

#[async_trait]
impl BusProducer for MemoryProducer {
    async fn send(&self, topic: &str, key: &str, payload: Bytes) -> Result<RecordPosition, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        self.broker.ensure_available()?;
        Ok(self.broker.topic(topic).append(key, payload))
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.broker.available.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct MemoryConsumer {
    broker: Arc<BrokerInner>,
    log: Arc<TopicLog>,
    group: String,
    /// Next offset to deliver, per partition.
    positions: Vec<u64>,
    /// Partition the next drain starts from, rotated for fairness.
    next_partition: usize,
    closed: bool,
}

impl MemoryConsumer {
    fn drain(&mut self, max_records: usize) -> Vec<BusRecord> {
        let count = self.positions.len();
        let mut out = Vec::new();
        for i in 0..count {
            if out.len() >= max_records {
                break;
            }
            let partition = (self.next_partition + i) % count;
            let log = self.log.partitions[partition].read();
            // Another member of the group may have committed, and released,
            // past this consumer's position.
            let mut offset = self.positions[partition].max(log.base);
            while out.len() < max_records {
                let Some(stored) = log.get(offset) else { break };
                out.push(to_bus_record(&self.log.name, partition, offset, stored));
                offset += 1;
            }
            self.positions[partition] = offset;
        }
        self.next_partition = (self.next_partition + 1) % count;
        out
    }
}

#[async_trait]
impl BusConsumer for MemoryConsumer {
    fn topic(&self) -> &str {
        &self.log.name
    }

    fn group(&self) -> &str {
        &self.group
    }

    async fn poll(
        &mut self,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<BusRecord>, BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }
        self.broker.ensure_available()?;

        let deadline = tokio::time::Instant::now() + timeout;
        let log = Arc::clone(&self.log);
        loop {
            // Register interest before draining so an append between the
            // drain and the wait still wakes us.
            let notified = log.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.drain(max_records.max(1));
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&mut self, record: &BusRecord) -> Result<(), BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }
        if record.topic != self.log.name {
            return Err(BusError::ForeignRecord {
                expected: self.log.name.clone(),
                got: record.topic.clone(),
            });
        }
        self.broker.ensure_available()?;
        self.broker.committed.insert(
            GroupPartition {
                group: self.group.clone(),
                topic: self.log.name.clone(),
                partition: record.partition,
            },
            record.offset + 1,
        );
        self.broker.release_committed(&self.log, record.partition);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
