//! Transport layer: sockets, connections and the connection registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                               ┌─────────────────┐
//! │  callers (many)  │                               │  Media server   │
//! │        │         │          WebSocket            │                 │
//! │   Connection ────┼──────────────────────────────►│  JSON-RPC 2.0   │
//! │   (event loop)   │◄──────────────────────────────┼─ responses      │
//! │        │         │                               │  onEvent        │
//! │   handlers       │                               │                 │
//! └──────────────────┘                               └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionRegistry::acquire` - dial the address once, register it
//! 2. `Connection::request` - send requests, await responses
//! 3. `Connection::subscribe` - receive `onEvent` notifications
//! 4. Transport failure - every pending request resolves to connection-lost
//! 5. `ConnectionRegistry::remove` / `close` - shut connections down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Multiplexed connection and event loop |
//! | `memory` | In-memory transport for tests |
//! | `registry` | One connection per address |
//! | `socket` | Transport traits and WebSocket implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Multiplexed connection and event loop.
pub mod connection;

/// In-memory transport.
pub mod memory;

/// Connection registry.
pub mod registry;

/// Transport traits and WebSocket implementation.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler, Liveness, PendingResponse};
pub use memory::{MemoryPeer, MemorySink, MemorySource, memory_transport};
pub use registry::ConnectionRegistry;
pub use socket::{MessageSink, MessageSource, WsSink, WsSource, resolve_url};
