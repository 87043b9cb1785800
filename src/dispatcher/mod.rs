//! Name-keyed handler registry with concurrent fan-out
//!
//! Handlers register for an event name and are invoked, each on its own task,
//! every time an event with that name is dispatched. `dispatch` resolves only
//! once every invoked handler has signalled completion.

mod completion;

pub use completion::CompletionSignal;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::{DispatcherError, DispatcherResult};
use crate::events::Event;
use crate::handler::{EventHandler, HandlerId};
use completion::Latch;

/// A single (event name, handler) registration
struct Registration {
    id: HandlerId,
    /// The registrant owns the handler; a dropped handler leaves a dead entry
    handler: Weak<dyn EventHandler>,
}

impl Registration {
    fn new(handler: &Arc<dyn EventHandler>) -> Self {
        Self {
            id: HandlerId::of(handler),
            handler: Arc::downgrade(handler),
        }
    }

    fn is_alive(&self) -> bool {
        self.handler.strong_count() > 0
    }
}

/// Statistics about dispatcher activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Number of events that reached at least one handler
    pub events_dispatched: u64,
    /// Number of events dispatched while nothing was registered for them
    pub events_without_handlers: u64,
    /// Total number of handler invocations started
    pub handler_invocations: u64,
    /// Number of handlers that missed the completion timeout
    pub handler_timeouts: u64,
    /// Count of dispatch calls by event name. Holds one entry per distinct
    /// name ever dispatched, including names with no handlers, until
    /// [`Dispatcher::reset_stats`] clears it.
    pub name_counts: HashMap<String, u64>,
}

/// In-process event dispatcher.
///
/// Cloning is cheap and every clone shares the same registry and statistics.
#[derive(Clone)]
pub struct Dispatcher {
    /// Handler registrations by event name, in registration order
    handlers: Arc<DashMap<String, Vec<Registration>>>,
    /// How long a dispatch waits for its handlers, if bounded
    handler_timeout: Option<Duration>,
    /// Statistics about dispatcher activity
    stats: Arc<RwLock<DispatcherStats>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher that waits for handlers indefinitely
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            handler_timeout: None,
            stats: Arc::new(RwLock::new(DispatcherStats::default())),
        }
    }

    /// Create an empty dispatcher from configuration
    pub fn with_config(config: &DispatcherConfig) -> Self {
        let dispatcher = Self::new();
        match config.handler_timeout() {
            Some(limit) => dispatcher.with_handler_timeout(limit),
            None => dispatcher,
        }
    }

    /// Bound how long `dispatch` waits for handlers to signal completion
    pub fn with_handler_timeout(mut self, limit: Duration) -> Self {
        info!(timeout = ?limit, "Dispatcher handler timeout configured");
        self.handler_timeout = Some(limit);
        self
    }

    /// The configured handler timeout, if any
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }

    /// Register `handler` for events named `event_name`.
    ///
    /// Fails with [`DispatcherError::HandlerAlreadyRegistered`] if this very
    /// handler instance is already registered for the name, in which case
    /// nothing changes.
    pub fn register(
        &self,
        event_name: &str,
        handler: &Arc<dyn EventHandler>,
    ) -> DispatcherResult<()> {
        let id = HandlerId::of(handler);
        let mut registrations = self.handlers.entry(event_name.to_string()).or_default();

        if registrations.iter().any(|r| r.id == id) {
            debug!(
                event_name = %event_name,
                handler_id = %id,
                "Handler already registered for event"
            );
            return Err(DispatcherError::already_registered(event_name, id));
        }

        registrations.retain(Registration::is_alive);
        registrations.push(Registration::new(handler));

        debug!(
            event_name = %event_name,
            handler_id = %id,
            handlers = registrations.len(),
            "Registered handler"
        );
        Ok(())
    }

    /// Remove `handler` from `event_name`. Unknown names or handlers are a
    /// no-op. Returns whether a registration was removed.
    pub fn remove(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let id = HandlerId::of(handler);

        let removed = match self.handlers.get_mut(event_name) {
            Some(mut registrations) => {
                let found = registrations.iter().any(|r| r.id == id);
                registrations.retain(|r| r.id != id && r.is_alive());
                found
            }
            None => false,
        };

        // An empty sequence is the same as no entry at all
        self.handlers
            .remove_if(event_name, |_, registrations| registrations.is_empty());

        if removed {
            debug!(
                event_name = %event_name,
                handler_id = %id,
                "Removed handler"
            );
        } else {
            trace!(
                event_name = %event_name,
                handler_id = %id,
                "Attempted to remove handler that is not registered"
            );
        }

        removed
    }

    /// Whether `handler` is currently registered for `event_name`
    pub fn has(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let id = HandlerId::of(handler);
        self.handlers
            .get(event_name)
            .map(|registrations| registrations.iter().any(|r| r.id == id))
            .unwrap_or(false)
    }

    /// Remove every registration for every event name
    pub fn clear(&self) {
        let names = self.handlers.len();
        self.handlers.clear();
        debug!(event_names = names, "Cleared all handlers");
    }

    /// Number of live handlers registered for `event_name`
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers
            .get(event_name)
            .map(|registrations| registrations.iter().filter(|r| r.is_alive()).count())
            .unwrap_or(0)
    }

    /// Ids of the live handlers registered for `event_name`, in registration order
    pub fn handler_ids(&self, event_name: &str) -> Vec<HandlerId> {
        self.handlers
            .get(event_name)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|r| r.is_alive())
                    .map(|r| r.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names that currently have at least one live handler, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .iter()
            .filter(|entry| entry.value().iter().any(Registration::is_alive))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Whether no live handler is registered at all
    pub fn is_empty(&self) -> bool {
        !self
            .handlers
            .iter()
            .any(|entry| entry.value().iter().any(Registration::is_alive))
    }

    /// Invoke every handler registered for the event's name, concurrently,
    /// and wait until all of them have signalled completion.
    ///
    /// Returns the number of handlers invoked; `Ok(0)` when nothing is
    /// registered. With a handler timeout configured, returns
    /// [`DispatcherError::HandlerTimeout`] if some handlers have not
    /// signalled in time. Those handlers keep running.
    ///
    /// Handlers are spawned with `tokio::spawn`, so this must be awaited
    /// from within a tokio runtime.
    pub async fn dispatch(&self, event: Arc<dyn Event>) -> DispatcherResult<usize> {
        let event_name = event.name().to_string();
        let handlers = self.snapshot(&event_name);

        if handlers.is_empty() {
            trace!(event_name = %event_name, "No handlers registered for event");
            self.record_unhandled(&event_name).await;
            return Ok(0);
        }

        let count = handlers.len();
        let latch = Latch::new(count);
        let shared_name: Arc<str> = Arc::from(event_name.as_str());

        debug!(
            event_name = %event_name,
            handlers = count,
            "Dispatching event"
        );

        for (id, handler) in handlers {
            let signal = CompletionSignal::new(Arc::clone(&latch), Arc::clone(&shared_name), id);
            let event = Arc::clone(&event);
            let name = Arc::clone(&shared_name);

            tokio::spawn(async move {
                trace!(event_name = %name, handler_id = %id, "Invoking handler");
                let outcome = AssertUnwindSafe(handler.handle(event, signal))
                    .catch_unwind()
                    .await;
                if outcome.is_err() {
                    error!(
                        event_name = %name,
                        handler_id = %id,
                        "Handler panicked while handling event"
                    );
                }
            });
        }

        self.record_dispatch(&event_name, count).await;

        match self.handler_timeout {
            None => latch.wait().await,
            Some(limit) => {
                if let Err(pending) = latch.wait_timeout(limit).await {
                    warn!(
                        event_name = %event_name,
                        pending,
                        timeout = ?limit,
                        "Handlers did not complete in time"
                    );
                    self.stats.write().await.handler_timeouts += pending as u64;
                    return Err(DispatcherError::timeout(&event_name, pending, limit));
                }
            }
        }

        trace!(event_name = %event_name, handlers = count, "All handlers completed");
        Ok(count)
    }

    /// Get current dispatcher statistics
    pub async fn stats(&self) -> DispatcherStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics counters
    pub async fn reset_stats(&self) {
        info!("Resetting dispatcher statistics");
        *self.stats.write().await = DispatcherStats::default();
    }

    /// Copy out the live handlers for a name so no lock is held during fan-out
    fn snapshot(&self, event_name: &str) -> Vec<(HandlerId, Arc<dyn EventHandler>)> {
        self.handlers
            .get(event_name)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter_map(|r| r.handler.upgrade().map(|handler| (r.id, handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn record_dispatch(&self, event_name: &str, handlers: usize) {
        let mut stats = self.stats.write().await;
        stats.events_dispatched += 1;
        stats.handler_invocations += handlers as u64;
        *stats.name_counts.entry(event_name.to_string()).or_insert(0) += 1;
    }

    async fn record_unhandled(&self, event_name: &str) {
        let mut stats = self.stats.write().await;
        stats.events_without_handlers += 1;
        *stats.name_counts.entry(event_name.to_string()).or_insert(0) += 1;
    }
}
