//! The in-memory `EventStore` implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tidemark_core::error::StoreError;
use tidemark_core::identifier::AggregateId;
use tidemark_core::store::{EventStore, RecordedEvent, StreamAppend};

type Streams = HashMap<AggregateId, Vec<RecordedEvent>>;

fn lock(streams: &Mutex<Streams>) -> MutexGuard<'_, Streams> {
    streams.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event store holding every stream in process memory.
///
/// Cloning shares the underlying streams.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<Mutex<Streams>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stream with pre-existing events, bypassing the transactional
    /// path. Test setup helper.
    pub fn seed(&self, identifier: &AggregateId, events: Vec<RecordedEvent>) {
        lock(&self.streams)
            .entry(identifier.clone())
            .or_default()
            .extend(events);
    }

    /// Returns a snapshot of one stream, in sequence order.
    #[must_use]
    pub fn stream(&self, identifier: &AggregateId) -> Vec<RecordedEvent> {
        lock(&self.streams)
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn contains(&self, identifier: &AggregateId) -> Result<bool, StoreError> {
        Ok(lock(&self.streams)
            .get(identifier)
            .is_some_and(|stream| !stream.is_empty()))
    }

    async fn events_since(
        &self,
        identifier: &AggregateId,
        minimum_version: u64,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        Ok(lock(&self.streams)
            .get(identifier)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.sequence_number > minimum_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn begin_append(
        &self,
        identifier: &AggregateId,
        expected_version: u64,
    ) -> Result<Box<dyn StreamAppend>, StoreError> {
        Ok(Box::new(InMemoryStreamAppend {
            streams: Arc::clone(&self.streams),
            identifier: identifier.clone(),
            expected_version,
            staged: Vec::new(),
        }))
    }
}

/// One staged per-stream append. Staged events live only in this value, so
/// dropping it uncommitted discards them.
struct InMemoryStreamAppend {
    streams: Arc<Mutex<Streams>>,
    identifier: AggregateId,
    expected_version: u64,
    staged: Vec<RecordedEvent>,
}

#[async_trait]
impl StreamAppend for InMemoryStreamAppend {
    fn identifier(&self) -> &AggregateId {
        &self.identifier
    }

    async fn write(
        &mut self,
        events: &[RecordedEvent],
        token: &CancellationToken,
    ) -> Result<(), StoreError> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.staged.extend_from_slice(events);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut streams = lock(&self.streams);
        let stream = streams.entry(self.identifier.clone()).or_default();
        let actual = stream.len() as u64;
        if actual != self.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                identifier: self.identifier.clone(),
                expected: self.expected_version,
                actual,
            });
        }
        stream.extend(self.staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged events are owned by this value; dropping them is the rollback.
        Ok(())
    }
}
