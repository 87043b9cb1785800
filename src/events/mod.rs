use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named occurrence that can be dispatched to handlers.
///
/// The dispatcher only ever looks at [`Event::name`]; payload and timestamp
/// are carried for the handlers.
pub trait Event: Send + Sync + fmt::Debug {
    /// Name used to look up registered handlers
    fn name(&self) -> &str;

    /// Arbitrary payload with event details
    fn payload(&self) -> &Value;

    /// When the event was created
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Default event type with a JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Name of the event (e.g., "order.created")
    name: String,
    /// Arbitrary JSON payload with event details
    #[serde(default)]
    payload: Value,
    /// Timestamp when the event was created
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    /// Unique event ID
    #[serde(default = "generate_uuid")]
    id: String,
}

/// Generate a UUID for events
fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl StreamEvent {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
            id: generate_uuid(),
        }
    }

    /// Get the unique id of this event
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Event for StreamEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn payload(&self) -> &Value {
        &self.payload
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
