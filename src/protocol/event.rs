//! Event notification types.
//!
//! Events are unsolicited notifications pushed by the server when a
//! server-side object changes state.
//!
//! # Format
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "method": "onEvent",
//!   "params": {
//!     "value": {
//!       "type": "EndOfStream",
//!       "object": "9b1c...-pipeline/4f2e...-player",
//!       "data": { "source": "...", "timestamp": "..." }
//!     }
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::ObjectId;

/// Method name of every event notification.
pub const EVENT_METHOD: &str = "onEvent";

// ============================================================================
// Event
// ============================================================================

/// An event notification from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Always [`EVENT_METHOD`].
    pub method: String,

    /// Notification params.
    pub params: EventParams,
}

/// Params of an event notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventParams {
    /// The event itself.
    pub value: EventValue,
}

/// Routing keys and payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventValue {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Source object id.
    pub object: ObjectId,

    /// Event payload handed to handlers.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Creates an event notification.
    #[must_use]
    pub fn new(event_type: impl Into<String>, object: impl Into<ObjectId>, data: Value) -> Self {
        Self {
            method: EVENT_METHOD.to_string(),
            params: EventParams {
                value: EventValue {
                    event_type: event_type.into(),
                    object: object.into(),
                    data,
                },
            },
        }
    }

    /// Returns the event type.
    #[inline]
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.params.value.event_type
    }

    /// Returns the source object id.
    #[inline]
    #[must_use]
    pub fn object(&self) -> &ObjectId {
        &self.params.value.object
    }

    /// Returns the event payload.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.params.value.data
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_parsing() {
        let json_str = r#"{
            "jsonrpc": "2.0",
            "method": "onEvent",
            "params": {
                "value": {
                    "type": "EndOfStream",
                    "object": "p1/player",
                    "data": { "source": "p1/player" }
                }
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert_eq!(event.event_type(), "EndOfStream");
        assert_eq!(event.object().as_str(), "p1/player");
        assert_eq!(event.data()["source"], "p1/player");
    }

    #[test]
    fn test_event_without_data() {
        let json_str = r#"{"method": "onEvent", "params": {"value": {"type": "T", "object": "o"}}}"#;
        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert_eq!(event.data(), &Value::Null);
    }

    #[test]
    fn test_event_roundtrip_shape() {
        let event = Event::new("Foo", "obj-1", json!({ "k": 1 }));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["method"], "onEvent");
        assert_eq!(value["params"]["value"]["type"], "Foo");
        assert_eq!(value["params"]["value"]["object"], "obj-1");
    }
}
