//! JSON-RPC message types and incoming message classification.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Method call, correlated by `id` |
//! | `Response` | Remote → Local | Result or error for one `id` |
//! | `Event` | Remote → Local | `onEvent` push notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Generic object-lifecycle method builders |
//! | `event` | Event notification types |
//! | `request` | Request, Response and RpcError types |

// ============================================================================
// Submodules
// ============================================================================

/// Generic method builders.
pub mod command;

/// Event notification types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use event::{EVENT_METHOD, Event, EventParams, EventValue};
pub use request::{JSONRPC_VERSION, Request, Response, RpcError, merge_options, set_if_not_empty};

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_str, from_value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Incoming
// ============================================================================

/// A classified incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Response to a request.
    Response(Response),
    /// Push notification.
    Event(Event),
    /// Well-formed JSON of no recognized shape.
    Unsupported(Value),
}

/// Decodes and classifies one incoming message.
///
/// A message is a response when it carries a positive integer `id` and a
/// non-null `result` or `error`; otherwise an event when its `method` is
/// [`EVENT_METHOD`]; otherwise unsupported.
///
/// # Errors
///
/// - [`Error::Json`] if the text is not JSON, or an event has a malformed
///   body. A response with a malformed `error` still classifies as a
///   response; see [`RpcError::from_payload`].
pub fn classify(text: &str) -> Result<Incoming> {
    let value: Value = from_str(text)?;

    if let Some(id) = value.get("id").and_then(positive_id) {
        let result = value.get("result").filter(|v| !v.is_null());
        let error = value.get("error").filter(|v| !v.is_null());

        if result.is_some() || error.is_some() {
            let error = error.cloned().map(RpcError::from_payload);
            return Ok(Incoming::Response(Response {
                id: Some(id),
                result: result.cloned(),
                error,
            }));
        }
    }

    if value.get("method").and_then(Value::as_str) == Some(EVENT_METHOD) {
        let event: Event = from_value(value)?;
        return Ok(Incoming::Event(event));
    }

    Ok(Incoming::Unsupported(value))
}

/// Reads a positive correlation id; integral floats are accepted.
fn positive_id(value: &Value) -> Option<RequestId> {
    if let Some(id) = value.as_u64() {
        return (id > 0).then(|| RequestId::new(id));
    }

    let id = value.as_f64()?;
    (id >= 1.0 && id.fract() == 0.0 && id <= u64::MAX as f64).then(|| RequestId::new(id as u64))
}

// ============================================================================
// Tests
// ============================================================================
