//! Event store contracts.
//!
//! The runtime does not define a storage byte format; it defines the
//! contract a backend must satisfy: per-stream reads ordered by sequence
//! number, an existence check, and per-stream sub-transactions with
//! optimistic concurrency checked at commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreError;
use crate::identifier::AggregateId;

/// Stored representation of a domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub aggregate_id: AggregateId,
    /// Event type tag for decode routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Position within the stream, starting at 1.
    pub sequence_number: u64,
    /// Correlation ID tracing the causing command, if enriched.
    pub correlation_id: Option<Uuid>,
    /// Causation ID linking to the causing message, if enriched.
    pub causation_id: Option<Uuid>,
    /// Timestamp of event recording.
    pub recorded_at: DateTime<Utc>,
}

/// Contract an event store backend implements.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns `true` if the stream for `identifier` holds at least one event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn contains(&self, identifier: &AggregateId) -> Result<bool, StoreError>;

    /// Reads the stream for `identifier`, ordered by sequence number,
    /// starting after `minimum_version`.
    ///
    /// An unknown identifier yields an empty sequence, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn events_since(
        &self,
        identifier: &AggregateId,
        minimum_version: u64,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Opens a per-stream sub-transaction for appending at `expected_version`.
    ///
    /// The concurrency check runs at [`StreamAppend::commit`], not here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn begin_append(
        &self,
        identifier: &AggregateId,
        expected_version: u64,
    ) -> Result<Box<dyn StreamAppend>, StoreError>;
}

/// One per-stream sub-transaction.
///
/// Writes are staged until [`commit`](StreamAppend::commit). Dropping an
/// uncommitted sub-transaction must discard its staged writes; that makes
/// drop-based cleanup equivalent to [`rollback`](StreamAppend::rollback).
#[async_trait]
pub trait StreamAppend: Send {
    /// The stream this sub-transaction appends to.
    fn identifier(&self) -> &AggregateId;

    /// Stages `events` for this stream.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] if `token` is cancelled, or another
    /// [`StoreError`] on a backend failure.
    async fn write(
        &mut self,
        events: &[RecordedEvent],
        token: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Commits the staged writes, checking the expected version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] if the stream moved past
    /// the expected version, or another [`StoreError`] on failure.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards the staged writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
