use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::handler::HandlerId;

/// Errors raised by the dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    /// The same handler instance is already registered for this event name
    #[error("Handler {handler} is already registered for event '{event_name}'")]
    HandlerAlreadyRegistered {
        event_name: String,
        handler: HandlerId,
    },

    /// Handlers did not signal completion within the configured timeout
    #[error("{pending} handler(s) for event '{event_name}' did not complete within {timeout:?}")]
    HandlerTimeout {
        event_name: String,
        pending: usize,
        timeout: Duration,
    },
}

/// Type alias for dispatcher results
pub type DispatcherResult<T> = Result<T, DispatcherError>;

impl DispatcherError {
    /// Create a duplicate registration error
    pub fn already_registered(event_name: &str, handler: HandlerId) -> Self {
        DispatcherError::HandlerAlreadyRegistered {
            event_name: event_name.to_string(),
            handler,
        }
    }

    /// Create a handler timeout error
    pub fn timeout(event_name: &str, pending: usize, timeout: Duration) -> Self {
        DispatcherError::HandlerTimeout {
            event_name: event_name.to_string(),
            pending,
            timeout,
        }
    }

    /// Error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatcherError::HandlerAlreadyRegistered { .. } => ErrorCode::HandlerAlreadyRegistered,
            DispatcherError::HandlerTimeout { .. } => ErrorCode::HandlerTimeout,
        }
    }

    /// Severity of the error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // The registry is left untouched, the caller can simply move on
            DispatcherError::HandlerAlreadyRegistered { .. } => ErrorSeverity::Warning,
            DispatcherError::HandlerTimeout { .. } => ErrorSeverity::Error,
        }
    }

    /// Name of the event the error relates to
    pub fn event_name(&self) -> &str {
        match self {
            DispatcherError::HandlerAlreadyRegistered { event_name, .. }
            | DispatcherError::HandlerTimeout { event_name, .. } => event_name,
        }
    }
}

/// Enumeration of error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    HandlerAlreadyRegistered,
    HandlerTimeout,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::HandlerAlreadyRegistered => "HANDLER_ALREADY_REGISTERED",
            ErrorCode::HandlerTimeout => "HANDLER_TIMEOUT",
        };
        write!(f, "{}", code_str)
    }
}

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Warning that doesn't prevent operation
    Warning,
    /// Error that affects functionality but allows continued operation
    Error,
}
