//! Client entry point and configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Owns a connection registry |
//! | [`ClientBuilder`] | Fluent, validated configuration |
//! | [`ConnectionOptions`] | Per-connection settings |
//!
//! # Example
//!
//! ```no_run
//! use kurento_rpc::{Client, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder().build()?;
//! let connection = client.connect("ws://127.0.0.1:8888").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Connection options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::{ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT_PATH};
