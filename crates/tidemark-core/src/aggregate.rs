//! Aggregate root replay/apply state machine.
//!
//! An aggregate kind is a state type implementing [`AggregateState`]; its
//! [`EventRouter`] is an explicit registry, built once per instance, that
//! maps each event type tag to an applier and a payload decoder. The
//! [`AggregateRoot`] wrapper owns the state, the router, the pending-change
//! list, and the `Uninitialized -> Initialized` lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AggregateError;
use crate::event::{DomainEvent, EventRef, TypedEvent};
use crate::identifier::AggregateId;
use crate::store::RecordedEvent;

type ApplyFn<S> = Box<dyn Fn(&mut S, &dyn DomainEvent) -> Result<(), AggregateError> + Send + Sync>;
type DecodeFn = Box<dyn Fn(&serde_json::Value) -> Result<EventRef, AggregateError> + Send + Sync>;

struct Route<S> {
    apply: ApplyFn<S>,
    decode: DecodeFn,
}

/// Registry mapping event type tags to appliers and decoders for one
/// aggregate kind.
pub struct EventRouter<S> {
    routes: HashMap<&'static str, Route<S>>,
}

impl<S: Send + Sync + 'static> EventRouter<S> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers `applier` for the event type `E`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::HandlerAlreadyRegistered`] if an applier is
    /// already registered for `E::EVENT_TYPE`.
    pub fn register<E, F>(&mut self, applier: F) -> Result<&mut Self, AggregateError>
    where
        E: TypedEvent,
        F: Fn(&mut S, &E) + Send + Sync + 'static,
    {
        if self.routes.contains_key(E::EVENT_TYPE) {
            return Err(AggregateError::HandlerAlreadyRegistered {
                event_type: E::EVENT_TYPE,
            });
        }
        let apply: ApplyFn<S> = Box::new(move |state, event| {
            if let Some(typed) = event.downcast_ref::<E>() {
                applier(state, typed);
                return Ok(());
            }
            // Same tag, foreign type: rebuild the typed event from its payload.
            let typed: E = serde_json::from_value(event.payload()).map_err(|source| {
                AggregateError::InvalidPayload {
                    event_type: E::EVENT_TYPE.to_owned(),
                    source,
                }
            })?;
            applier(state, &typed);
            Ok(())
        });
        let decode: DecodeFn = Box::new(|payload| {
            let typed: E = serde_json::from_value(payload.clone()).map_err(|source| {
                AggregateError::InvalidPayload {
                    event_type: E::EVENT_TYPE.to_owned(),
                    source,
                }
            })?;
            Ok(Arc::new(typed) as EventRef)
        });
        self.routes.insert(E::EVENT_TYPE, Route { apply, decode });
        Ok(self)
    }

    /// Routes `event` into `state` through its registered applier.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnhandledEvent`] if no applier is registered
    /// for the event's tag.
    fn route(&self, state: &mut S, event: &dyn DomainEvent) -> Result<(), AggregateError> {
        let route = self.routes.get(event.event_type()).ok_or_else(|| {
            AggregateError::UnhandledEvent {
                event_type: event.event_type().to_owned(),
            }
        })?;
        (route.apply)(state, event)
    }

    /// Decodes a stored event back into its typed form.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnhandledEvent`] for an unknown tag or
    /// [`AggregateError::InvalidPayload`] for a malformed payload.
    fn decode(&self, recorded: &RecordedEvent) -> Result<EventRef, AggregateError> {
        let route = self.routes.get(recorded.event_type.as_str()).ok_or_else(|| {
            AggregateError::UnhandledEvent {
                event_type: recorded.event_type.clone(),
            }
        })?;
        (route.decode)(&recorded.payload)
    }
}

impl<S: Send + Sync + 'static> Default for EventRouter<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one aggregate kind.
///
/// `Default` is the empty state a fresh instance starts from; `router()`
/// declares, once, how each event type mutates the state.
pub trait AggregateState: Default + Send + Sync + 'static {
    /// The kind tag carried by identifiers of this aggregate.
    const KIND: &'static str;

    /// Builds the event router for this kind.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::HandlerAlreadyRegistered`] if the same event
    /// type is registered twice; the defect surfaces before any instance is
    /// usable.
    fn router() -> Result<EventRouter<Self>, AggregateError>;
}

/// The replay/apply state machine for one aggregate instance.
///
/// Lifecycle: `Uninitialized -> Initialized`, exactly once, no way back.
/// Replay (`initialize`) routes history through the appliers without
/// touching the pending list; `apply` is the only way events enter it.
pub struct AggregateRoot<S: AggregateState> {
    state: S,
    router: EventRouter<S>,
    identifier: Option<AggregateId>,
    expected_version: u64,
    changes: Vec<EventRef>,
    initialized: bool,
}

impl<S: AggregateState + std::fmt::Debug> std::fmt::Debug for AggregateRoot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("state", &self.state)
            .field("identifier", &self.identifier)
            .field("expected_version", &self.expected_version)
            .field("changes", &self.changes)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl<S: AggregateState> AggregateRoot<S> {
    /// Creates an uninitialized instance with an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::HandlerAlreadyRegistered`] if the kind's
    /// router registers a duplicate event type.
    pub fn new() -> Result<Self, AggregateError> {
        Ok(Self {
            state: S::default(),
            router: S::router()?,
            identifier: None,
            expected_version: 0,
            changes: Vec::new(),
            initialized: false,
        })
    }

    /// Creates and initializes a brand-new instance at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidIdentifier`] for a nil or
    /// wrong-kind identifier, or a router construction defect.
    pub fn create(identifier: AggregateId) -> Result<Self, AggregateError> {
        let mut root = Self::new()?;
        root.initialize(identifier, 0, &[])?;
        Ok(root)
    }

    /// Initializes the instance by replaying `history`.
    ///
    /// Replay routes each stored event through the appliers without adding
    /// it to the pending list. The instance becomes initialized only after
    /// the whole history replays successfully.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::AlreadyInitialized`] on a second call.
    /// - [`AggregateError::InvalidIdentifier`] if `identifier` is nil or its
    ///   kind is not `S::KIND`.
    /// - [`AggregateError::UnhandledEvent`] / [`AggregateError::InvalidPayload`]
    ///   if a history event cannot be routed or decoded.
    pub fn initialize(
        &mut self,
        identifier: AggregateId,
        expected_version: u64,
        history: &[RecordedEvent],
    ) -> Result<(), AggregateError> {
        if self.initialized {
            return Err(AggregateError::AlreadyInitialized);
        }
        if identifier.is_nil() || identifier.kind() != S::KIND {
            return Err(AggregateError::InvalidIdentifier { identifier });
        }
        for recorded in history {
            let event = self.router.decode(recorded)?;
            self.router.route(&mut self.state, event.as_ref())?;
        }
        self.identifier = Some(identifier);
        self.expected_version = expected_version;
        self.initialized = true;
        Ok(())
    }

    /// Applies a new event: routes it into the state, then records it as a
    /// pending change.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotInitialized`] before `initialize`, or
    /// [`AggregateError::UnhandledEvent`] if no applier matches.
    pub fn apply<E: TypedEvent>(&mut self, event: E) -> Result<(), AggregateError> {
        self.apply_event(Arc::new(event))
    }

    /// Applies an already type-erased event. See [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// Same as [`apply`](Self::apply).
    pub fn apply_event(&mut self, event: EventRef) -> Result<(), AggregateError> {
        if !self.initialized {
            return Err(AggregateError::NotInitialized);
        }
        self.router.route(&mut self.state, event.as_ref())?;
        self.changes.push(event);
        Ok(())
    }

    /// Returns the identifier, once initialized.
    #[must_use]
    pub fn identifier(&self) -> Option<&AggregateId> {
        self.identifier.as_ref()
    }

    /// Returns the event count known durable at load time.
    #[must_use]
    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }

    /// Returns `true` once `initialize` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` if any applied event is pending persistence.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Returns the pending changes in application order, without draining.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotInitialized`] before `initialize`.
    pub fn changes(&self) -> Result<Vec<EventRef>, AggregateError> {
        if !self.initialized {
            return Err(AggregateError::NotInitialized);
        }
        Ok(self.changes.clone())
    }

    /// Drains and returns the pending changes in application order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotInitialized`] before `initialize`.
    pub fn take_changes(&mut self) -> Result<Vec<EventRef>, AggregateError> {
        if !self.initialized {
            return Err(AggregateError::NotInitialized);
        }
        Ok(std::mem::take(&mut self.changes))
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }
}
