//! Domain event abstractions.

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Trait that all domain events implement.
///
/// Events are immutable facts produced by an aggregate. They travel through
/// the runtime as `Arc<dyn DomainEvent>`; the type tag returned by
/// [`event_type`](DomainEvent::event_type) routes replay and storage, while
/// the runtime type routes post-commit dispatch.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type tag (used for replay routing and storage).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn payload(&self) -> serde_json::Value;

    /// Upcast for downcasting to the concrete event type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn DomainEvent + '_ {
    /// Attempts to downcast to a concrete event type.
    #[must_use]
    pub fn downcast_ref<E: DomainEvent + 'static>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// A [`DomainEvent`] with a compile-time-stable type tag.
///
/// Implementations must return [`EVENT_TYPE`](TypedEvent::EVENT_TYPE) from
/// [`DomainEvent::event_type`]; registration and payload decoding key on the
/// constant.
pub trait TypedEvent: DomainEvent + Serialize + DeserializeOwned + Sized + 'static {
    /// The stable type tag for this event.
    const EVENT_TYPE: &'static str;
}

/// Shared handle to an immutable domain event.
pub type EventRef = Arc<dyn DomainEvent>;
