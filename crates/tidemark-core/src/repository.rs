//! Aggregate repository: load-or-create through the unit of work.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::aggregate::{AggregateRoot, AggregateState};
use crate::error::RepositoryError;
use crate::identifier::AggregateId;
use crate::store::EventStore;
use crate::unit_of_work::{AggregateRootEntity, UnitOfWork};

/// Shared handle to one aggregate instance of kind `S`.
pub type AggregateHandle<S> = Arc<Mutex<AggregateRoot<S>>>;

/// Loads and creates aggregates of kind `S`.
///
/// The unit of work acts as a per-command cache: repeated `get` calls for the
/// same identifier return the same instance without touching the store, so
/// change tracking sees every mutation made during the command.
pub struct Repository<S: AggregateState> {
    unit_of_work: Arc<UnitOfWork>,
    store: Arc<dyn EventStore>,
    _kind: PhantomData<fn() -> S>,
}

impl<S: AggregateState> Repository<S> {
    /// Creates a repository bound to one command's unit of work.
    #[must_use]
    pub fn new(unit_of_work: Arc<UnitOfWork>, store: Arc<dyn EventStore>) -> Self {
        Self {
            unit_of_work,
            store,
            _kind: PhantomData,
        }
    }

    /// Returns `true` if the identifier is cached in the unit of work or
    /// known to the store.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Store`] on a backend failure.
    pub async fn contains(&self, identifier: &AggregateId) -> Result<bool, RepositoryError> {
        if self.unit_of_work.contains(identifier) {
            return Ok(true);
        }
        Ok(self.store.contains(identifier).await?)
    }

    /// Returns the aggregate for `identifier`, loading it on first access.
    ///
    /// A cached instance is returned without a store read. Otherwise the
    /// stream is loaded, a fresh aggregate is initialized with
    /// `expected_version = stream length`, attached, and returned.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::AggregateRootNotFound`] if the stream is empty.
    /// - [`RepositoryError::KindMismatch`] if the cached entity holds a
    ///   different aggregate kind.
    /// - [`RepositoryError::Aggregate`] on a replay defect.
    /// - [`RepositoryError::Store`] on a backend failure.
    pub async fn get(&self, identifier: &AggregateId) -> Result<AggregateHandle<S>, RepositoryError> {
        if let Some(entity) = self.unit_of_work.get(identifier) {
            return entity
                .root::<S>()
                .ok_or_else(|| RepositoryError::KindMismatch {
                    identifier: identifier.clone(),
                });
        }

        let history = self.store.events_since(identifier, 0).await?;
        if history.is_empty() {
            return Err(RepositoryError::AggregateRootNotFound {
                identifier: identifier.clone(),
            });
        }

        let expected_version = history.len() as u64;
        let mut root = AggregateRoot::<S>::new()?;
        root.initialize(identifier.clone(), expected_version, &history)?;
        let handle: AggregateHandle<S> = Arc::new(Mutex::new(root));
        self.unit_of_work.attach(AggregateRootEntity::new(
            identifier.clone(),
            expected_version,
            Arc::clone(&handle),
        ))?;
        Ok(handle)
    }

    /// Adds a brand-new aggregate at `expected_version = 0`.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::AggregateRootAlreadyExists`] if the identifier is
    ///   cached or already has stored events.
    /// - [`RepositoryError::Store`] on a backend failure.
    pub async fn add(
        &self,
        identifier: &AggregateId,
        root: AggregateRoot<S>,
    ) -> Result<AggregateHandle<S>, RepositoryError> {
        if self.contains(identifier).await? {
            return Err(RepositoryError::AggregateRootAlreadyExists {
                identifier: identifier.clone(),
            });
        }
        let handle: AggregateHandle<S> = Arc::new(Mutex::new(root));
        self.unit_of_work.attach(AggregateRootEntity::new(
            identifier.clone(),
            0,
            Arc::clone(&handle),
        ))?;
        Ok(handle)
    }
}

impl<S: AggregateState> std::fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &S::KIND)
            .finish_non_exhaustive()
    }
}
