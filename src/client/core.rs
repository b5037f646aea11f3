//! Client coordinator.
//!
//! A [`Client`] owns one [`ConnectionRegistry`] and is the usual entry
//! point. Cloning is cheap; clones share the registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::transport::{Connection, ConnectionRegistry};

use super::builder::ClientBuilder;
use super::options::ConnectionOptions;

// ============================================================================
// Client
// ============================================================================

/// Entry point owning a connection registry.
#[derive(Clone)]
pub struct Client {
    registry: Arc<ConnectionRegistry>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", self.registry.options())
            .field("closed", &self.registry.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from already validated options.
    pub(crate) fn new(options: ConnectionOptions) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(options)),
        }
    }

    /// Returns the shared connection for `address`, dialing it if needed.
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::acquire`].
    pub async fn connect(&self, address: &str) -> Result<Connection> {
        self.registry.acquire(address).await
    }

    /// Returns the registry backing this client.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Returns the options applied to new connections.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        self.registry.options()
    }

    /// Shuts down every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down client");
        self.registry.close().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
