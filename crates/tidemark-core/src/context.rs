//! Per-command handling context.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::aggregate::AggregateState;
use crate::repository::Repository;
use crate::store::EventStore;
use crate::unit_of_work::{UnitOfWork, lock_unpoisoned};

/// Property bag scoped to one command invocation.
///
/// Owns the [`UnitOfWork`] for the command's duration and hands out
/// repositories bound to it. Handlers may stash typed properties for
/// cross-cutting concerns (the enricher reads the correlation id from here).
pub struct CommandHandlingContext {
    correlation_id: Uuid,
    unit_of_work: Arc<UnitOfWork>,
    store: Arc<dyn EventStore>,
    properties: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl CommandHandlingContext {
    /// Creates a context with a fresh unit of work.
    #[must_use]
    pub fn new(correlation_id: Uuid, store: Arc<dyn EventStore>) -> Self {
        Self {
            correlation_id,
            unit_of_work: Arc::new(UnitOfWork::new()),
            store,
            properties: Mutex::new(HashMap::new()),
        }
    }

    /// The correlation id of the command being handled.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The unit of work tracking this command's aggregates.
    #[must_use]
    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    /// Builds a repository for aggregate kind `S`, bound to this command's
    /// unit of work and the processor's store.
    #[must_use]
    pub fn repository<S: AggregateState>(&self) -> Repository<S> {
        Repository::new(Arc::clone(&self.unit_of_work), Arc::clone(&self.store))
    }

    /// Stores a typed property under `key`, replacing any previous value.
    pub fn set_property<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        lock_unpoisoned(&self.properties).insert(key.into(), Arc::new(value));
    }

    /// Reads a typed property, if present with the requested type.
    #[must_use]
    pub fn property<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        lock_unpoisoned(&self.properties)
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for CommandHandlingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandlingContext")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
