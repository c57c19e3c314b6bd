//! Command abstractions.

use std::any::Any;

use uuid::Uuid;

/// Trait that all commands implement.
///
/// A command is an immutable intent. Its runtime type is the dispatch key
/// used to resolve handlers; beyond payload fields it carries only a
/// correlation id for tracing the command through its effects.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Returns the command type name (for logging and routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// Upcast for downcasting to the concrete command type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Command + '_ {
    /// Attempts to downcast to a concrete command type.
    #[must_use]
    pub fn downcast_ref<C: Command + 'static>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }
}
