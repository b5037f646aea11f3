//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use kurento_rpc::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_request_timeout(Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Path appended to server addresses that carry none.
pub const DEFAULT_ENDPOINT_PATH: &str = "/kurento";

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Settings applied to every connection a registry opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Time allowed for TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,

    /// Deadline applied by `Connection::call`; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Path dialed when the address has none.
    pub endpoint_path: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Removes the default request timeout.
    #[inline]
    #[must_use]
    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    /// Sets the endpoint path.
    #[inline]
    #[must_use]
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.request_timeout, None);
        assert_eq!(options.endpoint_path, "/kurento");
    }

    #[test]
    fn test_builder_methods() {
        let options = ConnectionOptions::new()
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_millis(250))
            .with_endpoint_path("/rpc");

        assert_eq!(options.connect_timeout, Duration::from_secs(1));
        assert_eq!(options.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.endpoint_path, "/rpc");

        let options = options.without_request_timeout();
        assert_eq!(options.request_timeout, None);
    }
}
