//! Post-commit event fan-out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProcessingError;
use crate::event::EventRef;
use crate::handler::HandlerResolver;

/// Fans committed events out to their subscribers.
///
/// Dispatch runs strictly after a successful commit. For each event, in
/// stored order, a fresh resolution scope is opened, the ordered handler
/// list for the event's runtime type is invoked sequentially, and the scope
/// is dropped before the next event. No handler error is swallowed.
pub struct EventDispatcher {
    resolver: Arc<dyn HandlerResolver>,
}

impl EventDispatcher {
    /// Creates a dispatcher drawing handlers from `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self { resolver }
    }

    /// Dispatches `events` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DispatchFailed`] on the first handler
    /// error; the remaining dispatch is aborted. Committed storage is never
    /// affected.
    pub async fn dispatch(
        &self,
        events: &[EventRef],
        token: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        for event in events {
            let scope = self.resolver.begin_scope();
            let handlers = scope.event_handlers(event.as_ref());
            debug!(
                event_type = event.event_type(),
                handlers = handlers.len(),
                "dispatching event"
            );
            for handler in handlers {
                handler
                    .handle(event.as_ref(), token)
                    .await
                    .map_err(|source| ProcessingError::DispatchFailed {
                        event_type: event.event_type().to_owned(),
                        source,
                    })?;
            }
            drop(scope);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
