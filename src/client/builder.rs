//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use kurento_rpc::Client;
//!
//! # fn example() -> kurento_rpc::Result<()> {
//! let client = Client::builder()
//!     .connect_timeout(Duration::from_secs(5))
//!     .request_timeout(Duration::from_secs(30))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

use super::core::Client;
use super::options::ConnectionOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    options: ConnectionOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time allowed for connect plus handshake.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Sets the default deadline for `Connection::call`.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = Some(timeout);
        self
    }

    /// Sets the path dialed when an address carries none.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute path, e.g. "/kurento"
    #[inline]
    #[must_use]
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.options.endpoint_path = path.into();
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the connect timeout is zero
    /// - [`Error::Config`] if a request timeout is set to zero
    /// - [`Error::Config`] if the endpoint path does not start with `/`
    pub fn build(self) -> Result<Client> {
        self.validate()?;
        Ok(Client::new(self.options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<()> {
        if self.options.connect_timeout.is_zero() {
            return Err(Error::config(
                "Connect timeout must be greater than zero.\n\
                 Example: Client::builder().connect_timeout(Duration::from_secs(30))",
            ));
        }

        if self.options.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config(
                "Request timeout must be greater than zero when set.",
            ));
        }

        if !self.options.endpoint_path.starts_with('/') {
            return Err(Error::config(format!(
                "Endpoint path '{}' must start with '/'.\n\
                 Example: Client::builder().endpoint_path(\"/kurento\")",
                self.options.endpoint_path
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
