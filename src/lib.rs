//! Kurento RPC - session-aware, multiplexed JSON-RPC client.
//!
//! This library speaks the JSON-RPC 2.0 dialect of media servers such as
//! Kurento over a single long-lived WebSocket per server.
//!
//! # Architecture
//!
//! Many callers share one connection:
//!
//! - **Requests**: every request gets a fresh id; responses are correlated
//!   back to the caller whatever order they arrive in
//! - **Events**: `onEvent` notifications are routed to handlers keyed by
//!   event type, source object and handler id
//! - **Session**: the first session id the server hands out is attached to
//!   every later request
//!
//! Key design principles:
//!
//! - One [`Connection`] per server address, owned by a [`ConnectionRegistry`]
//! - One event loop task per connection owns the socket
//! - Every request resolves exactly once, even when the transport dies
//! - A dead connection is never replaced behind the caller's back
//!
//! # Quick Start
//!
//! ```no_run
//! use kurento_rpc::{Client, RemoteObject, Result};
//! use serde_json::{Map, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().build()?;
//!     let connection = client.connect("ws://127.0.0.1:8888").await?;
//!
//!     let pipeline = RemoteObject::create(&connection, "MediaPipeline", Map::new()).await?;
//!     pipeline
//!         .subscribe("Error", |data: &Value| eprintln!("pipeline error: {data}"))
//!         .await?;
//!
//!     pipeline.release().await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder and [`ConnectionOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`object`] | [`RemoteObject`] handles |
//! | [`protocol`] | JSON-RPC message types |
//! | [`transport`] | Sockets, connections and the registry |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing request, object and handler ids.
pub mod identifiers;

/// Handles to server-side objects.
pub mod object;

/// JSON-RPC message types.
///
/// Request envelopes, responses, events and incoming message classification.
pub mod protocol;

/// Transport layer.
///
/// WebSocket sockets, multiplexed connections and the connection registry.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ConnectionOptions};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{HandlerId, ObjectId, RequestId};

// Object types
pub use object::RemoteObject;

// Protocol types
pub use protocol::{Command, Event, Request, Response, RpcError};

// Transport types
pub use transport::{Connection, ConnectionRegistry, EventHandler, Liveness, PendingResponse};
