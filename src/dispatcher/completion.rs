//! Per-dispatch completion tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::handler::HandlerId;

/// Countdown shared by the signals of a single dispatch
pub(crate) struct Latch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl Latch {
    pub(crate) fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        })
    }

    /// Number of signals still outstanding
    pub(crate) fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    fn count_down(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Resolves once every signal has fired
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent count_down
            // between the load and the await cannot be missed.
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `limit`, returning the
    /// number of signals still outstanding.
    pub(crate) async fn wait_timeout(&self, limit: Duration) -> Result<(), usize> {
        if timeout(limit, self.wait()).await.is_ok() {
            return Ok(());
        }
        self.settle()
    }

    /// A count that reached zero after the limit expired still counts as released
    fn settle(&self) -> Result<(), usize> {
        match self.remaining() {
            0 => Ok(()),
            pending => Err(pending),
        }
    }
}

/// One-shot "I am done" notification handed to a handler with each event.
///
/// Calling [`done`](Self::done) consumes the signal, so it can fire at most
/// once. A signal that is dropped without being used still releases the
/// dispatch waiting on it.
pub struct CompletionSignal {
    latch: Option<Arc<Latch>>,
    event_name: Arc<str>,
    handler: HandlerId,
}

impl CompletionSignal {
    pub(crate) fn new(latch: Arc<Latch>, event_name: Arc<str>, handler: HandlerId) -> Self {
        Self {
            latch: Some(latch),
            event_name,
            handler,
        }
    }

    /// Report that the handler has finished with the event
    pub fn done(mut self) {
        if let Some(latch) = self.latch.take() {
            trace!(
                event_name = %self.event_name,
                handler_id = %self.handler,
                "Handler signalled completion"
            );
            latch.count_down();
        }
    }

    /// Name of the event this signal belongs to
    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(latch) = self.latch.take() {
            if !std::thread::panicking() {
                warn!(
                    event_name = %self.event_name,
                    handler_id = %self.handler,
                    "Completion signal dropped without being signalled"
                );
            }
            latch.count_down();
        }
    }
}
