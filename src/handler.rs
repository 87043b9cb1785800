//! Handler capability and handler identity.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::dispatcher::CompletionSignal;
use crate::events::Event;

/// Something that wants to be told about events.
///
/// `handle` is invoked once per dispatch for every registration. The
/// implementation must call [`CompletionSignal::done`] when it has finished
/// processing; the dispatch that invoked it does not return before that (or
/// before the signal is dropped). The signal may be moved elsewhere, e.g. into
/// a spawned task, and signalled from there.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<dyn Event>, done: CompletionSignal);
}

/// Identity of a registered handler instance.
///
/// Two handlers compare equal only when they are the same allocation, never
/// because their contents match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

impl HandlerId {
    /// Identity of the value behind `handler`
    pub fn of<H: ?Sized>(handler: &Arc<H>) -> Self {
        HandlerId(Arc::as_ptr(handler) as *const () as usize)
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: usize) -> Self {
        HandlerId(raw)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Adapts a synchronous callback into an [`EventHandler`].
///
/// Completion is signalled as soon as the callback returns. Callback errors
/// are logged and otherwise ignored.
pub struct FnHandler<F> {
    callback: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&dyn Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }

    /// Wrap the callback straight into a shareable handler reference
    pub fn shared(callback: F) -> Arc<dyn EventHandler> {
        Arc::new(Self::new(callback))
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&dyn Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<dyn Event>, done: CompletionSignal) {
        if let Err(e) = (self.callback)(event.as_ref()) {
            error!(
                event_name = %event.name(),
                error = %e,
                "Handler callback failed"
            );
        }
        done.done();
    }
}
