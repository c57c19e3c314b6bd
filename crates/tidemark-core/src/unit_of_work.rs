//! Per-command change tracking.
//!
//! A [`UnitOfWork`] lives for exactly one `process` call. It caches every
//! aggregate loaded or added during that call so repeated lookups return the
//! same instance, and it remembers attachment order so the transactional
//! append step iterates deterministically.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::aggregate::{AggregateRoot, AggregateState};
use crate::error::{AggregateError, UnitOfWorkError};
use crate::event::EventRef;
use crate::identifier::AggregateId;

/// Locks a mutex, recovering the guard if a handler panic poisoned it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object-safe view over one aggregate's pending changes.
pub trait ChangeRecorder: Send + Sync {
    /// Returns `true` if the aggregate holds pending changes.
    fn has_changes(&self) -> bool;

    /// Drains the aggregate's pending changes in application order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotInitialized`] if the aggregate was never
    /// initialized.
    fn take_changes(&self) -> Result<Vec<EventRef>, AggregateError>;
}

impl<S: AggregateState> ChangeRecorder for Mutex<AggregateRoot<S>> {
    fn has_changes(&self) -> bool {
        lock_unpoisoned(self).has_changes()
    }

    fn take_changes(&self) -> Result<Vec<EventRef>, AggregateError> {
        lock_unpoisoned(self).take_changes()
    }
}

/// One tracked aggregate: its identifier, the version known durable at load
/// time, and a shared, type-erased handle to the root.
#[derive(Clone)]
pub struct AggregateRootEntity {
    identifier: AggregateId,
    expected_version: u64,
    recorder: Arc<dyn ChangeRecorder>,
    root: Arc<dyn Any + Send + Sync>,
}

impl AggregateRootEntity {
    /// Wraps a shared aggregate root handle.
    #[must_use]
    pub fn new<S: AggregateState>(
        identifier: AggregateId,
        expected_version: u64,
        root: Arc<Mutex<AggregateRoot<S>>>,
    ) -> Self {
        Self {
            identifier,
            expected_version,
            recorder: root.clone(),
            root,
        }
    }

    /// Returns the tracked identifier.
    #[must_use]
    pub fn identifier(&self) -> &AggregateId {
        &self.identifier
    }

    /// Returns the version recorded when the aggregate was attached.
    #[must_use]
    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }

    /// Returns `true` if the aggregate holds pending changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.recorder.has_changes()
    }

    /// Drains the aggregate's pending changes in application order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotInitialized`] if the aggregate was never
    /// initialized.
    pub fn take_changes(&self) -> Result<Vec<EventRef>, AggregateError> {
        self.recorder.take_changes()
    }

    /// Downcasts the handle back to its concrete aggregate kind.
    #[must_use]
    pub fn root<S: AggregateState>(&self) -> Option<Arc<Mutex<AggregateRoot<S>>>> {
        self.root.clone().downcast::<Mutex<AggregateRoot<S>>>().ok()
    }
}

impl std::fmt::Debug for AggregateRootEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRootEntity")
            .field("identifier", &self.identifier)
            .field("expected_version", &self.expected_version)
            .finish_non_exhaustive()
    }
}

/// The per-command aggregate cache and change tracker.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    entities: Mutex<Vec<AggregateRootEntity>>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an entity.
    ///
    /// # Errors
    ///
    /// Returns [`UnitOfWorkError::AlreadyAttached`] if the identifier is
    /// already tracked; the first attachment is left unchanged.
    pub fn attach(&self, entity: AggregateRootEntity) -> Result<(), UnitOfWorkError> {
        let mut entities = lock_unpoisoned(&self.entities);
        if entities
            .iter()
            .any(|existing| existing.identifier() == entity.identifier())
        {
            return Err(UnitOfWorkError::AlreadyAttached {
                identifier: entity.identifier().clone(),
            });
        }
        entities.push(entity);
        Ok(())
    }

    /// Looks up an attached entity. Pure lookup, no side effect.
    #[must_use]
    pub fn get(&self, identifier: &AggregateId) -> Option<AggregateRootEntity> {
        lock_unpoisoned(&self.entities)
            .iter()
            .find(|entity| entity.identifier() == identifier)
            .cloned()
    }

    /// Returns `true` if the identifier is attached.
    #[must_use]
    pub fn contains(&self, identifier: &AggregateId) -> bool {
        self.get(identifier).is_some()
    }

    /// Returns `true` if any attached aggregate holds pending changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        lock_unpoisoned(&self.entities)
            .iter()
            .any(AggregateRootEntity::has_changes)
    }

    /// Returns the changed entities in attachment order.
    #[must_use]
    pub fn changes(&self) -> Vec<AggregateRootEntity> {
        lock_unpoisoned(&self.entities)
            .iter()
            .filter(|entity| entity.has_changes())
            .cloned()
            .collect()
    }
}
