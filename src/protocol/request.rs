//! Request envelope, Response and RpcError message types.
//!
//! # Request Format
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "id": 1,
//!   "sessionId": "c9c5d0b4-...",
//!   "method": "invoke",
//!   "params": { "object": "...", "operation": "play", "sessionId": "..." }
//! }
//! ```
//!
//! `id` and `sessionId` are stamped by the connection; callers only supply
//! `method` and `params`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Command;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Request
// ============================================================================

/// An outgoing call envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Protocol version marker.
    pub jsonrpc: &'static str,

    /// Correlation id, set by the connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Session token, set by the connection once the server assigned one.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Remote method name.
    pub method: String,

    /// Method parameters.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Creates an envelope for an arbitrary method.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            session_id: None,
            method: method.into(),
            params,
        }
    }

    /// Creates a keep-alive `ping` envelope.
    #[inline]
    #[must_use]
    pub fn ping(interval_ms: u64) -> Self {
        Command::Ping { interval_ms }.into()
    }

    /// Stamps the session token.
    ///
    /// The token goes on the envelope and, when `params` is an object that
    /// does not already name a session, inside `params` as well.
    pub(crate) fn stamp_session(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());

        if let Value::Object(params) = &mut self.params {
            params
                .entry("sessionId")
                .or_insert_with(|| Value::String(session_id.to_string()));
        }
    }
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        Self::new(command.method(), command.params())
    }
}

// ============================================================================
// RpcError
// ============================================================================

/// Error payload carried inside a response.
///
/// Server-reported errors are propagated verbatim. The connection also
/// produces synthetic errors with the reserved codes below; branch on
/// [`RpcError::is_connection_lost`] rather than on the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Error code.
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// The connection died before a response arrived.
    pub const CONNECTION_LOST: i64 = -32001;

    /// The caller's deadline expired before a response arrived.
    pub const REQUEST_TIMEOUT: i64 = -32002;

    /// The envelope could not be encoded.
    pub const ENCODE_FAILED: i64 = -32003;

    /// The server sent an error payload that is not `{code, message, data?}`.
    pub const MALFORMED: i64 = -32603;

    /// Creates an error payload.
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Synthetic connection-lost error.
    #[inline]
    #[must_use]
    pub fn connection_lost() -> Self {
        Self::new(Self::CONNECTION_LOST, "Connection lost")
    }

    /// Synthetic deadline-expired error.
    #[inline]
    #[must_use]
    pub fn request_timeout(timeout_ms: u64) -> Self {
        Self {
            code: Self::REQUEST_TIMEOUT,
            message: format!("Request timed out after {timeout_ms}ms"),
            data: Some(json!({ "timeoutMs": timeout_ms })),
        }
    }

    /// Decodes a server error payload, keeping it when it is malformed.
    ///
    /// A payload that is not a well-formed error object becomes a
    /// [`RpcError::MALFORMED`] error carrying the raw JSON in `data`.
    #[must_use]
    pub fn from_payload(payload: Value) -> Self {
        if let Ok(error) = serde_json::from_value::<Self>(payload.clone()) {
            return error;
        }

        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| payload.as_str())
            .unwrap_or("Malformed error payload")
            .to_string();

        Self {
            code: Self::MALFORMED,
            message,
            data: Some(payload),
        }
    }

    /// Synthetic encoding error.
    #[inline]
    #[must_use]
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::new(Self::ENCODE_FAILED, message)
    }

    /// Returns `true` for the synthetic connection-lost error.
    #[inline]
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        self.code == Self::CONNECTION_LOST
    }

    /// Returns `true` for the synthetic deadline-expired error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code == Self::REQUEST_TIMEOUT
    }

    /// Returns `true` if the error was produced locally.
    #[inline]
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self.code,
            Self::CONNECTION_LOST | Self::REQUEST_TIMEOUT | Self::ENCODE_FAILED
        )
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response to a request, either from the server or synthesized locally.
///
/// # Format
///
/// ```json
/// { "id": 1, "result": { "value": "...", "sessionId": "..." } }
/// { "id": 1, "error": { "code": 40101, "message": "...", "data": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id. `None` only for the dead-connection fast path, where
    /// no id was allocated.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// Result map (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Synthetic response for a request that can no longer be answered.
    #[inline]
    #[must_use]
    pub fn connection_lost(id: Option<RequestId>) -> Self {
        Self::failure(id, RpcError::connection_lost())
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns `true` if the request failed because the connection died.
    #[inline]
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        self.error.as_ref().is_some_and(RpcError::is_connection_lost)
    }

    /// Returns the session token carried in the result, if non-empty.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|v| v.get("sessionId"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Extracts the result map, returning an error if the response failed.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] for the synthetic connection-lost response
    /// - [`Error::RequestTimeout`] for the synthetic deadline response
    /// - [`Error::Rpc`] for any other error payload
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(error) if error.is_connection_lost() => Err(Error::ConnectionClosed),
            Some(error) if error.is_timeout() => {
                let timeout_ms = error
                    .data
                    .as_ref()
                    .and_then(|d| d.get("timeoutMs"))
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                match self.id {
                    Some(id) => Err(Error::request_timeout(id, timeout_ms)),
                    None => Err(Error::Rpc(error)),
                }
            }
            Some(error) => Err(Error::Rpc(error)),
        }
    }

    /// Extracts `result.value`, the conventional return slot.
    ///
    /// # Errors
    ///
    /// Same as [`Response::into_result`].
    pub fn into_value(self) -> Result<Value> {
        let mut result = self.into_result()?;
        Ok(result
            .as_object_mut()
            .and_then(|m| m.remove("value"))
            .unwrap_or(Value::Null))
    }

    /// Gets a string value from the result.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

// ============================================================================
// Params Helpers
// ============================================================================

/// Inserts `value` under `key` unless it is null or an empty string.
pub fn set_if_not_empty(params: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    let value = value.into();
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if !empty {
        params.insert(key.to_string(), value);
    }
}

/// Overlays caller-supplied options onto default parameters.
pub fn merge_options(defaults: &mut Map<String, Value>, options: Map<String, Value>) {
    for (key, value) in options {
        defaults.insert(key, value);
    }
}

// ============================================================================
// Tests
// ============================================================================
