//! Error taxonomy for the runtime.
//!
//! Four families, with different recovery expectations:
//!
//! - [`AggregateError`]: programming defects in aggregate wiring or use.
//!   Never retried.
//! - [`UnitOfWorkError`] and the business variants of [`RepositoryError`]:
//!   surfaced to the application layer (typically mapped to not-found or
//!   conflict responses).
//! - [`StoreError::ConcurrencyConflict`]: transient; the caller retries the
//!   whole command from scratch so aggregates reload with fresh versions.
//! - [`ProcessingError::DispatchFailed`]: raised strictly after a successful
//!   commit. Durable state is kept; subscribers may be under-notified.

use thiserror::Error;

use crate::identifier::AggregateId;

/// Boxed error returned by command and event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Defects in aggregate wiring or lifecycle use.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A second applier was registered for the same event type tag.
    #[error("an applier is already registered for event type '{event_type}'")]
    HandlerAlreadyRegistered {
        /// The duplicated event type tag.
        event_type: &'static str,
    },

    /// No applier is registered for an event's type tag.
    #[error("no applier registered for event type '{event_type}'")]
    UnhandledEvent {
        /// The unroutable event type tag.
        event_type: String,
    },

    /// The aggregate was used before `initialize`.
    #[error("aggregate root has not been initialized")]
    NotInitialized,

    /// `initialize` was called twice on the same instance.
    #[error("aggregate root is already initialized")]
    AlreadyInitialized,

    /// The identifier was nil or its kind did not match the aggregate's.
    #[error("invalid identifier for aggregate root: {identifier}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: AggregateId,
    },

    /// A stored payload failed to decode during replay.
    #[error("failed to decode payload for event type '{event_type}'")]
    InvalidPayload {
        /// The event type tag whose payload was malformed.
        event_type: String,
        /// The decode failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the per-command change tracker.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// An entity with this identifier is already attached.
    #[error("aggregate {identifier} is already attached to this unit of work")]
    AlreadyAttached {
        /// The identifier attached twice.
        identifier: AggregateId,
    },
}

/// Errors surfaced by an event store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stream version at commit differed from the expected version.
    #[error("concurrency conflict on {identifier}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        identifier: AggregateId,
        /// The version the writer expected.
        expected: u64,
        /// The version the store found.
        actual: u64,
    },

    /// The operation was cancelled before completion.
    #[error("store operation cancelled")]
    Cancelled,

    /// A transport or backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from loading or creating aggregates.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The stream for the identifier holds zero events.
    #[error("aggregate root not found: {identifier}")]
    AggregateRootNotFound {
        /// The identifier with no stored events.
        identifier: AggregateId,
    },

    /// The identifier is already known to the unit of work or the store.
    #[error("aggregate root already exists: {identifier}")]
    AggregateRootAlreadyExists {
        /// The conflicting identifier.
        identifier: AggregateId,
    },

    /// A cached entity for this identifier holds a different aggregate kind.
    #[error("aggregate {identifier} is attached with a different state type")]
    KindMismatch {
        /// The identifier whose cached entity did not downcast.
        identifier: AggregateId,
    },

    /// An aggregate lifecycle defect.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// A change-tracker failure.
    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    /// A store failure while reading or checking a stream.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level errors from [`CommandProcessor::process`](crate::processor::CommandProcessor::process).
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// No handler is registered for the command's runtime type.
    #[error("no handler registered for command '{command_type}'")]
    UnhandledCommand {
        /// The unrouted command type name.
        command_type: &'static str,
    },

    /// A command handler failed; nothing was persisted.
    #[error("handler for command '{command_type}' failed")]
    Handler {
        /// The command whose handler failed.
        command_type: &'static str,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },

    /// Processing was cancelled before the transaction began committing.
    #[error("command processing cancelled")]
    Cancelled,

    /// An aggregate lifecycle defect while collecting changes.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// A store failure during append, commit, or rollback.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An event handler failed after the commit succeeded.
    ///
    /// Durable state is unaffected; subscribers after the failing handler
    /// were not notified.
    #[error("dispatch of event '{event_type}' failed after commit")]
    DispatchFailed {
        /// The event whose handler failed.
        event_type: String,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },
}
