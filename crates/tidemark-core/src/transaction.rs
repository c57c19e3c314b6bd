//! Multi-stream transactional append wrapper.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::event::EventRef;
use crate::identifier::AggregateId;
use crate::store::{EventStore, RecordedEvent, StreamAppend};

/// Hook applied to each record before it is written.
pub type EnrichFn = Box<dyn Fn(RecordedEvent) -> RecordedEvent + Send + Sync>;

/// A logical transaction spanning one or more streams.
///
/// Each [`store_events`](EventStoreTransaction::store_events) call opens a
/// new per-stream sub-transaction — two calls for the same identifier are
/// never merged — and enqueues it FIFO. [`commit`](EventStoreTransaction::commit)
/// drains the queue in order; a sub-transaction that fails after earlier
/// ones committed does not roll those back. Cross-stream atomicity is
/// explicitly not guaranteed.
pub struct EventStoreTransaction {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    enrich: Option<EnrichFn>,
    pending: VecDeque<Box<dyn StreamAppend>>,
}

impl EventStoreTransaction {
    /// Opens a logical transaction against `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            enrich: None,
            pending: VecDeque::new(),
        }
    }

    /// Installs an enrichment hook applied to every record before writing.
    #[must_use]
    pub fn with_enricher(mut self, enrich: EnrichFn) -> Self {
        self.enrich = Some(enrich);
        self
    }

    /// Serializes `events` and stages them on a new sub-transaction for
    /// `identifier` at `expected_version`.
    ///
    /// Sequence numbers continue from `expected_version`; timestamps come
    /// from the clock. Returns the records as written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] if `token` is cancelled, or another
    /// [`StoreError`] from opening or writing the sub-transaction.
    pub async fn store_events(
        &mut self,
        identifier: &AggregateId,
        expected_version: u64,
        events: &[EventRef],
        token: &CancellationToken,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let records: Vec<RecordedEvent> = events
            .iter()
            .enumerate()
            .map(|(offset, event)| {
                let record = RecordedEvent {
                    event_id: Uuid::new_v4(),
                    aggregate_id: identifier.clone(),
                    event_type: event.event_type().to_owned(),
                    payload: event.payload(),
                    sequence_number: expected_version + offset as u64 + 1,
                    correlation_id: None,
                    causation_id: None,
                    recorded_at: self.clock.now(),
                };
                match &self.enrich {
                    Some(enrich) => enrich(record),
                    None => record,
                }
            })
            .collect();

        let mut append = self.store.begin_append(identifier, expected_version).await?;
        append.write(&records, token).await?;
        debug!(
            identifier = %identifier,
            expected_version,
            count = records.len(),
            "staged events on sub-transaction"
        );
        self.pending.push_back(append);
        Ok(records)
    }

    /// Commits every queued sub-transaction in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns the first commit failure. Sub-transactions committed before
    /// the failure stay committed; the remainder stay queued for
    /// [`rollback`](EventStoreTransaction::rollback) or drop.
    pub async fn commit(&mut self) -> Result<(), StoreError> {
        let mut committed = 0_usize;
        while let Some(append) = self.pending.pop_front() {
            let identifier = append.identifier().clone();
            if let Err(err) = append.commit().await {
                warn!(
                    identifier = %identifier,
                    committed,
                    remaining = self.pending.len(),
                    "sub-transaction commit failed; earlier commits stand"
                );
                return Err(err);
            }
            committed += 1;
        }
        debug!(committed, "transaction committed");
        Ok(())
    }

    /// Rolls back every queued sub-transaction. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the first rollback failure; the queue is drained regardless.
    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        let mut first_error = None;
        while let Some(append) = self.pending.pop_front() {
            let identifier = append.identifier().clone();
            if let Err(err) = append.rollback().await {
                warn!(identifier = %identifier, "sub-transaction rollback failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of queued, uncommitted sub-transactions.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for EventStoreTransaction {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            // Backends discard staged writes when a sub-transaction drops
            // uncommitted, so dropping here is equivalent to rollback.
            warn!(
                pending = self.pending.len(),
                "transaction dropped with pending sub-transactions"
            );
            self.pending.clear();
        }
    }
}

impl std::fmt::Debug for EventStoreTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStoreTransaction")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// The tests for this module live in `tests/transaction_tests.rs`: they use
// `tidemark-memstore`, which links the library build of this crate, so a
// unit-test module here would see a second, incompatible copy of the types.
