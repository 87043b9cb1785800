pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;

#[cfg(test)]
mod tests;

// Re-export core components
pub use crate::config::DispatcherConfig;
pub use crate::dispatcher::{CompletionSignal, Dispatcher, DispatcherStats};
pub use crate::error::{DispatcherError, DispatcherResult, ErrorCode, ErrorSeverity};
pub use crate::events::{Event, StreamEvent};
pub use crate::handler::{EventHandler, FnHandler, HandlerId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
