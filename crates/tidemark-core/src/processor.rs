//! Command processing orchestration.
//!
//! `process` runs one command through the full pipeline: resolve handlers,
//! invoke them against a fresh unit of work, append the tracked changes
//! inside a logical store transaction, commit, then dispatch the committed
//! events. The processor is a long-lived, thread-safe value; every call
//! carries its own context, unit of work, and transaction.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::context::CommandHandlingContext;
use crate::dispatcher::EventDispatcher;
use crate::error::ProcessingError;
use crate::event::EventRef;
use crate::handler::HandlerResolver;
use crate::store::{EventStore, RecordedEvent};
use crate::transaction::EventStoreTransaction;
use crate::unit_of_work::AggregateRootEntity;

/// Hook adding contextual metadata to records before they are written.
pub trait EventEnricher: Send + Sync {
    /// Returns the enriched record.
    fn enrich(&self, record: RecordedEvent, ctx: &CommandHandlingContext) -> RecordedEvent;
}

/// Default enricher: stamps the command's correlation id on records that
/// carry none.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEnricher;

impl EventEnricher for CorrelationEnricher {
    fn enrich(&self, mut record: RecordedEvent, ctx: &CommandHandlingContext) -> RecordedEvent {
        if record.correlation_id.is_none() {
            record.correlation_id = Some(ctx.correlation_id());
        }
        record
    }
}

/// Builder wiring a [`CommandProcessor`] at composition time.
pub struct CommandProcessorBuilder {
    store: Arc<dyn EventStore>,
    resolver: Arc<dyn HandlerResolver>,
    enricher: Option<Arc<dyn EventEnricher>>,
    clock: Arc<dyn Clock>,
}

impl CommandProcessorBuilder {
    /// Starts a builder from the two required collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            store,
            resolver,
            enricher: Some(Arc::new(CorrelationEnricher)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the default [`CorrelationEnricher`].
    #[must_use]
    pub fn enricher(mut self, enricher: Arc<dyn EventEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Removes the enrichment hook entirely.
    #[must_use]
    pub fn without_enricher(mut self) -> Self {
        self.enricher = None;
        self
    }

    /// Replaces the system clock (tests inject a fixed clock here).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the processor.
    #[must_use]
    pub fn build(self) -> CommandProcessor {
        CommandProcessor {
            dispatcher: EventDispatcher::new(Arc::clone(&self.resolver)),
            store: self.store,
            resolver: self.resolver,
            enricher: self.enricher,
            clock: self.clock,
        }
    }
}

/// The top-level command-processing pipeline.
pub struct CommandProcessor {
    store: Arc<dyn EventStore>,
    resolver: Arc<dyn HandlerResolver>,
    dispatcher: EventDispatcher,
    enricher: Option<Arc<dyn EventEnricher>>,
    clock: Arc<dyn Clock>,
}

impl CommandProcessor {
    /// Starts a builder.
    #[must_use]
    pub fn builder(
        store: Arc<dyn EventStore>,
        resolver: Arc<dyn HandlerResolver>,
    ) -> CommandProcessorBuilder {
        CommandProcessorBuilder::new(store, resolver)
    }

    /// Processes one command and returns the committed records, in their
    /// stored order. A command whose handlers make no changes returns an
    /// empty list and performs zero store operations.
    ///
    /// Cancellation is honored through handler invocation and append; once
    /// commit has begun, the token is ignored so durability stays
    /// unambiguous.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::UnhandledCommand`] if no handler is registered;
    ///   the store is never touched.
    /// - [`ProcessingError::Handler`] if a handler fails; nothing persisted.
    /// - [`ProcessingError::Store`] if append or commit fails; queued
    ///   sub-transactions are rolled back and none of this command's events
    ///   become observable (subject to the documented cross-stream commit
    ///   caveat).
    /// - [`ProcessingError::DispatchFailed`] if a subscriber fails after the
    ///   commit; durable state is kept.
    pub async fn process(
        &self,
        command: &dyn Command,
        token: &CancellationToken,
    ) -> Result<Vec<RecordedEvent>, ProcessingError> {
        let command_type = command.command_type();
        debug!(command_type, correlation_id = %command.correlation_id(), "processing command");

        // The scope and context live to the end of this call; dropping them
        // on any exit path releases the resolved handlers and the unit of
        // work together.
        let scope = self.resolver.begin_scope();
        let ctx = Arc::new(CommandHandlingContext::new(
            command.correlation_id(),
            Arc::clone(&self.store),
        ));

        let handlers = scope.command_handlers(command);
        if handlers.is_empty() {
            return Err(ProcessingError::UnhandledCommand { command_type });
        }

        for handler in handlers {
            if token.is_cancelled() {
                return Err(ProcessingError::Cancelled);
            }
            handler
                .handle(command, &ctx, token)
                .await
                .map_err(|source| ProcessingError::Handler {
                    command_type,
                    source,
                })?;
        }

        let unit_of_work = ctx.unit_of_work();
        if !unit_of_work.has_changes() {
            debug!(command_type, "no changes; skipping store");
            return Ok(vec![]);
        }
        if token.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        let mut transaction =
            EventStoreTransaction::new(Arc::clone(&self.store), Arc::clone(&self.clock));
        if let Some(enricher) = &self.enricher {
            let enricher = Arc::clone(enricher);
            let ctx = Arc::clone(&ctx);
            transaction = transaction
                .with_enricher(Box::new(move |record| enricher.enrich(record, &ctx)));
        }

        let changed = unit_of_work.changes();
        let mut dispatchable: Vec<EventRef> = Vec::new();
        let mut committed: Vec<RecordedEvent> = Vec::new();
        let appended = append_changes(
            &mut transaction,
            &changed,
            token,
            &mut dispatchable,
            &mut committed,
        )
        .await;
        if let Err(err) = appended {
            roll_back(&mut transaction).await;
            return Err(err);
        }

        if let Err(err) = transaction.commit().await {
            roll_back(&mut transaction).await;
            return Err(err.into());
        }

        self.dispatcher.dispatch(&dispatchable, token).await?;
        debug!(command_type, events = committed.len(), "command processed");
        Ok(committed)
    }
}

async fn append_changes(
    transaction: &mut EventStoreTransaction,
    changed: &[AggregateRootEntity],
    token: &CancellationToken,
    dispatchable: &mut Vec<EventRef>,
    committed: &mut Vec<RecordedEvent>,
) -> Result<(), ProcessingError> {
    for entity in changed {
        if token.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }
        let events = entity.take_changes()?;
        let records = transaction
            .store_events(entity.identifier(), entity.expected_version(), &events, token)
            .await?;
        dispatchable.extend(events);
        committed.extend(records);
    }
    Ok(())
}

async fn roll_back(transaction: &mut EventStoreTransaction) {
    if let Err(rollback_err) = transaction.rollback().await {
        warn!(error = %rollback_err, "rollback failed after aborted commit");
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor").finish_non_exhaustive()
    }
}
