//! Typed builders for the generic object-lifecycle methods.
//!
//! Every per-entity operation on the server is expressed through a handful
//! of generic methods; this module builds their parameter maps so callers
//! never hand-assemble them.
//!
//! | Method | Params |
//! |--------|--------|
//! | `create` | `type`, `constructorParams`, `properties`? |
//! | `invoke` | `object`, `operation`, `operationParams`? |
//! | `subscribe` | `object`, `type` |
//! | `unsubscribe` | `object`, `subscription` |
//! | `release` | `object` |
//! | `ping` | `interval` |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, json};

use crate::identifiers::{HandlerId, ObjectId};

// ============================================================================
// Command
// ============================================================================

/// A generic remote method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a server-side object.
    Create {
        /// Remote type name, e.g. `MediaPipeline`.
        type_name: String,
        /// Constructor parameters.
        constructor_params: Map<String, Value>,
        /// Optional initial properties.
        properties: Option<Map<String, Value>>,
    },

    /// Invoke an operation on an object.
    Invoke {
        /// Target object.
        object: ObjectId,
        /// Operation name.
        operation: String,
        /// Operation parameters, omitted when empty.
        operation_params: Map<String, Value>,
    },

    /// Ask the server to emit events of a type for an object.
    Subscribe {
        /// Event source.
        object: ObjectId,
        /// Event type.
        event_type: String,
    },

    /// Cancel a server-side subscription.
    Unsubscribe {
        /// Event source.
        object: ObjectId,
        /// Subscription id returned by `subscribe`.
        subscription: HandlerId,
    },

    /// Release a server-side object.
    Release {
        /// Object to release.
        object: ObjectId,
    },

    /// Keep-alive.
    Ping {
        /// Interval the client promises to ping within, in milliseconds.
        interval_ms: u64,
    },
}

impl Command {
    /// Returns the wire method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Invoke { .. } => "invoke",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Release { .. } => "release",
            Self::Ping { .. } => "ping",
        }
    }

    /// Builds the wire params object.
    #[must_use]
    pub fn params(&self) -> Value {
        match self {
            Self::Create {
                type_name,
                constructor_params,
                properties,
            } => {
                let mut params = json!({
                    "type": type_name,
                    "constructorParams": constructor_params,
                });
                if let Some(properties) = properties {
                    params["properties"] = Value::Object(properties.clone());
                }
                params
            }

            Self::Invoke {
                object,
                operation,
                operation_params,
            } => {
                let mut params = json!({
                    "object": object,
                    "operation": operation,
                });
                if !operation_params.is_empty() {
                    params["operationParams"] = Value::Object(operation_params.clone());
                }
                params
            }

            Self::Subscribe { object, event_type } => json!({
                "object": object,
                "type": event_type,
            }),

            Self::Unsubscribe {
                object,
                subscription,
            } => json!({
                "object": object,
                "subscription": subscription,
            }),

            Self::Release { object } => json!({ "object": object }),

            Self::Ping { interval_ms } => json!({ "interval": interval_ms }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
