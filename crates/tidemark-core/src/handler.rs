//! Handler traits, registries, and the resolution-scope abstraction.
//!
//! Handlers are wired explicitly at composition time: a registry maps each
//! command or event runtime type to an ordered list of handler instances.
//! There is no container and no type scanning; the [`HandlerResolver`] trait
//! is the seam where an application could substitute its own resolution
//! mechanism, and its scopes bound handler lifetime with plain RAII.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::context::CommandHandlingContext;
use crate::error::HandlerError;
use crate::event::DomainEvent;

/// Handles one command type.
#[async_trait]
pub trait CommandHandler<C: Command + 'static>: Send + Sync {
    /// Handles the command within the given context.
    ///
    /// # Errors
    ///
    /// Any error aborts the command before a transaction is opened.
    async fn handle(
        &self,
        command: &C,
        ctx: &CommandHandlingContext,
        token: &CancellationToken,
    ) -> Result<(), HandlerError>;
}

/// Handles one event type after commit.
#[async_trait]
pub trait EventHandler<E: DomainEvent + 'static>: Send + Sync {
    /// Handles a committed event.
    ///
    /// # Errors
    ///
    /// Errors abort the remaining dispatch; committed storage is unaffected.
    async fn handle(&self, event: &E, token: &CancellationToken) -> Result<(), HandlerError>;
}

/// Type-erased command handler as stored in registries.
#[async_trait]
pub trait ErasedCommandHandler: Send + Sync {
    /// Handles a type-erased command.
    ///
    /// # Errors
    ///
    /// Propagates the typed handler's error.
    async fn handle(
        &self,
        command: &dyn Command,
        ctx: &CommandHandlingContext,
        token: &CancellationToken,
    ) -> Result<(), HandlerError>;
}

/// Type-erased event handler as stored in registries.
#[async_trait]
pub trait ErasedEventHandler: Send + Sync {
    /// Handles a type-erased event.
    ///
    /// # Errors
    ///
    /// Propagates the typed handler's error.
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        token: &CancellationToken,
    ) -> Result<(), HandlerError>;
}

struct CommandAdapter<C, H> {
    inner: H,
    _command: PhantomData<fn() -> C>,
}

#[async_trait]
impl<C, H> ErasedCommandHandler for CommandAdapter<C, H>
where
    C: Command + 'static,
    H: CommandHandler<C>,
{
    async fn handle(
        &self,
        command: &dyn Command,
        ctx: &CommandHandlingContext,
        token: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let typed = command
            .downcast_ref::<C>()
            .ok_or_else(|| format!("command routed to a handler of another type: {}", command.command_type()))?;
        self.inner.handle(typed, ctx, token).await
    }
}

struct EventAdapter<E, H> {
    inner: H,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedEventHandler for EventAdapter<E, H>
where
    E: DomainEvent + 'static,
    H: EventHandler<E>,
{
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        token: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let typed = event
            .downcast_ref::<E>()
            .ok_or_else(|| format!("event routed to a handler of another type: {}", event.event_type()))?;
        self.inner.handle(typed, token).await
    }
}

/// Explicit registry of command handlers, keyed by command runtime type.
#[derive(Default)]
pub struct CommandHandlerRegistry {
    handlers: HashMap<TypeId, Vec<Arc<dyn ErasedCommandHandler>>>,
}

impl CommandHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for command type `C`, after any already
    /// registered for `C`.
    pub fn register<C, H>(&mut self, handler: H) -> &mut Self
    where
        C: Command + 'static,
        H: CommandHandler<C> + 'static,
    {
        self.handlers
            .entry(TypeId::of::<C>())
            .or_default()
            .push(Arc::new(CommandAdapter {
                inner: handler,
                _command: PhantomData,
            }));
        self
    }

    /// Resolves the ordered handler list for a command's runtime type.
    #[must_use]
    pub fn resolve(&self, command: &dyn Command) -> Vec<Arc<dyn ErasedCommandHandler>> {
        self.handlers
            .get(&command.as_any().type_id())
            .cloned()
            .unwrap_or_default()
    }
}

/// Explicit registry of event handlers, keyed by event runtime type.
#[derive(Default)]
pub struct EventHandlerRegistry {
    handlers: HashMap<TypeId, Vec<Arc<dyn ErasedEventHandler>>>,
}

impl EventHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for event type `E`, after any already registered
    /// for `E`.
    pub fn register<E, H>(&mut self, handler: H) -> &mut Self
    where
        E: DomainEvent + 'static,
        H: EventHandler<E> + 'static,
    {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Arc::new(EventAdapter {
                inner: handler,
                _event: PhantomData,
            }));
        self
    }

    /// Resolves the ordered handler list for an event's runtime type.
    #[must_use]
    pub fn resolve(&self, event: &dyn DomainEvent) -> Vec<Arc<dyn ErasedEventHandler>> {
        self.handlers
            .get(&event.as_any().type_id())
            .cloned()
            .unwrap_or_default()
    }
}

/// One resolution scope. Dropping the scope disposes the instances it
/// resolved.
pub trait HandlerScope: Send + Sync {
    /// Resolves the ordered command handler list for `command`.
    fn command_handlers(&self, command: &dyn Command) -> Vec<Arc<dyn ErasedCommandHandler>>;

    /// Resolves the ordered event handler list for `event`.
    fn event_handlers(&self, event: &dyn DomainEvent) -> Vec<Arc<dyn ErasedEventHandler>>;
}

/// Resolution mechanism the processor and dispatcher draw handlers from.
pub trait HandlerResolver: Send + Sync {
    /// Opens a scope bounding the lifetime of resolved handler instances.
    fn begin_scope(&self) -> Box<dyn HandlerScope>;
}

/// Default resolver backed by the two static registries.
#[derive(Default)]
pub struct StaticHandlerRegistry {
    commands: Arc<CommandHandlerRegistry>,
    events: Arc<EventHandlerRegistry>,
}

impl StaticHandlerRegistry {
    /// Combines a command registry and an event registry into a resolver.
    #[must_use]
    pub fn new(commands: CommandHandlerRegistry, events: EventHandlerRegistry) -> Self {
        Self {
            commands: Arc::new(commands),
            events: Arc::new(events),
        }
    }
}

struct StaticScope {
    commands: Arc<CommandHandlerRegistry>,
    events: Arc<EventHandlerRegistry>,
}

impl HandlerScope for StaticScope {
    fn command_handlers(&self, command: &dyn Command) -> Vec<Arc<dyn ErasedCommandHandler>> {
        self.commands.resolve(command)
    }

    fn event_handlers(&self, event: &dyn DomainEvent) -> Vec<Arc<dyn ErasedEventHandler>> {
        self.events.resolve(event)
    }
}

impl HandlerResolver for StaticHandlerRegistry {
    fn begin_scope(&self) -> Box<dyn HandlerScope> {
        Box::new(StaticScope {
            commands: Arc::clone(&self.commands),
            events: Arc::clone(&self.events),
        })
    }
}
