//! Test stores — mock `EventStore` implementations for tests.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tidemark_core::error::StoreError;
use tidemark_core::identifier::AggregateId;
use tidemark_core::store::{EventStore, RecordedEvent, StreamAppend};
use tidemark_memstore::InMemoryEventStore;

use crate::call_log::CallLog;

/// An event store that records every call to a [`CallLog`] and delegates to
/// an [`InMemoryEventStore`]. Use it to assert call order and store-touch
/// counts across the processing pipeline.
#[derive(Debug, Clone)]
pub struct RecordingEventStore {
    inner: InMemoryEventStore,
    log: CallLog,
}

impl RecordingEventStore {
    /// Creates a recording store writing to `log`.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            log,
        }
    }

    /// Seeds a stream with pre-existing events without logging.
    pub fn seed(&self, identifier: &AggregateId, events: Vec<RecordedEvent>) {
        self.inner.seed(identifier, events);
    }

    /// Returns a snapshot of one stream, in sequence order.
    #[must_use]
    pub fn stream(&self, identifier: &AggregateId) -> Vec<RecordedEvent> {
        self.inner.stream(identifier)
    }

    /// The log this store writes to.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl EventStore for RecordingEventStore {
    async fn contains(&self, identifier: &AggregateId) -> Result<bool, StoreError> {
        self.log.push(format!("contains:{identifier}"));
        self.inner.contains(identifier).await
    }

    async fn events_since(
        &self,
        identifier: &AggregateId,
        minimum_version: u64,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        self.log.push(format!("events_since:{identifier}"));
        self.inner.events_since(identifier, minimum_version).await
    }

    async fn begin_append(
        &self,
        identifier: &AggregateId,
        expected_version: u64,
    ) -> Result<Box<dyn StreamAppend>, StoreError> {
        self.log
            .push(format!("begin_append:{identifier}@{expected_version}"));
        let inner = self.inner.begin_append(identifier, expected_version).await?;
        Ok(Box::new(RecordingStreamAppend {
            inner,
            log: self.log.clone(),
        }))
    }
}

struct RecordingStreamAppend {
    inner: Box<dyn StreamAppend>,
    log: CallLog,
}

#[async_trait]
impl StreamAppend for RecordingStreamAppend {
    fn identifier(&self) -> &AggregateId {
        self.inner.identifier()
    }

    async fn write(
        &mut self,
        events: &[RecordedEvent],
        token: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.log
            .push(format!("write:{}x{}", self.inner.identifier(), events.len()));
        self.inner.write(events, token).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.log.push(format!("commit:{}", self.inner.identifier()));
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.log
            .push(format!("rollback:{}", self.inner.identifier()));
        self.inner.rollback().await
    }
}

/// An event store whose sub-transactions always fail their commit with a
/// concurrency conflict. Reads delegate to an inner in-memory store so
/// aggregates can still load.
#[derive(Debug, Clone, Default)]
pub struct ConflictingEventStore {
    inner: InMemoryEventStore,
}

impl ConflictingEventStore {
    /// Creates an empty conflicting store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stream with pre-existing events.
    pub fn seed(&self, identifier: &AggregateId, events: Vec<RecordedEvent>) {
        self.inner.seed(identifier, events);
    }

    /// Returns a snapshot of one stream.
    #[must_use]
    pub fn stream(&self, identifier: &AggregateId) -> Vec<RecordedEvent> {
        self.inner.stream(identifier)
    }
}

#[async_trait]
impl EventStore for ConflictingEventStore {
    async fn contains(&self, identifier: &AggregateId) -> Result<bool, StoreError> {
        self.inner.contains(identifier).await
    }

    async fn events_since(
        &self,
        identifier: &AggregateId,
        minimum_version: u64,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        self.inner.events_since(identifier, minimum_version).await
    }

    async fn begin_append(
        &self,
        identifier: &AggregateId,
        expected_version: u64,
    ) -> Result<Box<dyn StreamAppend>, StoreError> {
        Ok(Box::new(ConflictingStreamAppend {
            identifier: identifier.clone(),
            expected_version,
        }))
    }
}

struct ConflictingStreamAppend {
    identifier: AggregateId,
    expected_version: u64,
}

#[async_trait]
impl StreamAppend for ConflictingStreamAppend {
    fn identifier(&self) -> &AggregateId {
        &self.identifier
    }

    async fn write(
        &mut self,
        _events: &[RecordedEvent],
        token: &CancellationToken,
    ) -> Result<(), StoreError> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Err(StoreError::ConcurrencyConflict {
            identifier: self.identifier.clone(),
            expected: self.expected_version,
            actual: self.expected_version + 1,
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// An event store that always returns a backend error. Useful for testing
/// error-handling paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn contains(&self, _identifier: &AggregateId) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn events_since(
        &self,
        _identifier: &AggregateId,
        _minimum_version: u64,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn begin_append(
        &self,
        _identifier: &AggregateId,
        _expected_version: u64,
    ) -> Result<Box<dyn StreamAppend>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}
