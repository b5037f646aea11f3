//! Registry of connections keyed by server address.
//!
//! Guarantees at most one [`Connection`] per address for its lifetime.
//! A dead connection stays registered until it is explicitly removed; the
//! registry never reconnects on its own.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              ConnectionRegistry               │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ ws://media-1:8888 → Connection (alive)  │  │
//! │  │ ws://media-2:8888 → Connection (dead)   │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

use crate::client::ConnectionOptions;
use crate::error::{Error, Result};

use super::connection::Connection;

// ============================================================================
// Types
// ============================================================================

/// A registered connection, or a dial in progress.
type Slot = Arc<OnceCell<Connection>>;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Owns one [`Connection`] per server address.
///
/// Each address has its own slot. Concurrent first acquisitions of one
/// address share a single dial, while dials to other addresses proceed
/// independently.
pub struct ConnectionRegistry {
    /// Options used by [`ConnectionRegistry::acquire`].
    options: ConnectionOptions,

    /// Slots by address, exactly as given. Never locked across an await.
    slots: Mutex<FxHashMap<String, Slot>>,

    /// Set once by [`ConnectionRegistry::close`].
    closed: AtomicBool,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("options", &self.options)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionRegistry - Constructor
// ============================================================================

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            slots: Mutex::new(FxHashMap::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the options applied to new connections.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ConnectionOptions::default())
    }
}

// ============================================================================
// ConnectionRegistry - Public API
// ============================================================================

impl ConnectionRegistry {
    /// Returns the connection for `address`, opening a WebSocket if needed.
    ///
    /// An existing connection is returned as is, even when dead.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistryClosed`] after [`ConnectionRegistry::close`]
    /// - [`Error::Config`] if the address is not a WebSocket URL
    /// - [`Error::ConnectionTimeout`] / [`Error::Connection`] if the connect fails
    pub async fn acquire(&self, address: &str) -> Result<Connection> {
        let options = &self.options;
        self.acquire_with(address, |address| async move {
            Connection::connect(&address, options).await
        })
        .await
    }

    /// Like [`acquire`](Self::acquire), with a caller-supplied connector.
    ///
    /// `connect` runs only when no connection is registered for `address`
    /// and no other caller is already dialing it. On failure nothing is
    /// registered.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistryClosed`] after [`ConnectionRegistry::close`]
    /// - Whatever `connect` returns
    pub async fn acquire_with<F, Fut>(&self, address: &str, connect: F) -> Result<Connection>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Connection>>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::RegistryClosed);
            }
            Arc::clone(slots.entry(address.to_string()).or_default())
        };

        if let Some(connection) = slot.get() {
            trace!(address, alive = connection.is_alive(), "Reusing connection");
            return Ok(connection.clone());
        }

        let result = slot
            .get_or_try_init(|| {
                debug!(address, "Opening connection");
                connect(address.to_string())
            })
            .await
            .cloned();

        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                warn!(address, error = %e, "Connection failed");
                self.discard_empty_slot(address, &slot);
                return Err(e);
            }
        };

        if self.closed.load(Ordering::Acquire) {
            connection.shutdown();
            return Err(Error::RegistryClosed);
        }

        info!(address, "Connection registered");
        Ok(connection)
    }

    /// Returns the registered connection for `address`, if any.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Connection> {
        self.slots
            .lock()
            .get(address)
            .and_then(|slot| slot.get().cloned())
    }

    /// Unregisters and shuts down the connection for `address`.
    ///
    /// The next [`acquire`](Self::acquire) opens a fresh connection.
    pub fn remove(&self, address: &str) -> Option<Connection> {
        let slot = self.slots.lock().remove(address)?;
        let connection = slot.get()?.clone();
        connection.shutdown();
        info!(address, "Connection removed");
        Some(connection)
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shuts down every connection and waits for their event loops.
    ///
    /// Later acquisitions fail with [`Error::RegistryClosed`]. A dial still
    /// in progress shuts its connection down once it completes.
    pub async fn close(&self) {
        let connections: Vec<Connection> = {
            let mut slots = self.slots.lock();
            self.closed.store(true, Ordering::Release);
            slots
                .drain()
                .filter_map(|(_, slot)| slot.get().cloned())
                .collect()
        };

        info!(count = connections.len(), "Closing connection registry");

        for connection in &connections {
            connection.shutdown();
        }
        for connection in &connections {
            connection.join().await;
        }
    }
}

// ============================================================================
// ConnectionRegistry - Internal
// ============================================================================

impl ConnectionRegistry {
    /// Drops a slot whose dial failed, unless another caller still waits on it.
    fn discard_empty_slot(&self, address: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        let discard = slots.get(address).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) <= 2
        });
        if discard {
            slots.remove(address);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::protocol::Request;
    use crate::transport::memory::{MemoryPeer, memory_transport};

    /// Connector over the in-memory transport that counts its invocations.
    #[derive(Default, Clone)]
    struct MemoryConnector {
        calls: Arc<AtomicUsize>,
        peers: Arc<parking_lot::Mutex<Vec<MemoryPeer>>>,
    }

    impl MemoryConnector {
        async fn connect(&self, address: String) -> Result<Connection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let (sink, source, peer) = memory_transport();
            self.peers.lock().push(peer);
            Ok(Connection::spawn(
                address,
                sink,
                source,
                &ConnectionOptions::default(),
            ))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_concurrent_acquire_creates_one_connection() {
        let registry = Arc::new(ConnectionRegistry::default());
        let connector = MemoryConnector::default();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let connector = connector.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .acquire_with("mem://a", |address| async move {
                        connector.connect(address).await
                    })
                    .await
            }));
        }

        let mut connections = Vec::new();
        for task in tasks {
            connections.push(task.await.expect("task").expect("acquire"));
        }

        assert_eq!(connector.calls(), 1);
        assert!(connections.iter().all(|c| c.ptr_eq(&connections[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_addresses_get_distinct_connections() {
        let registry = ConnectionRegistry::default();
        let connector = MemoryConnector::default();

        let a = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("a");
        let b = registry
            .acquire_with("mem://b", |address| connector.connect(address))
            .await
            .expect("b");

        assert!(!a.ptr_eq(&b));
        assert_eq!(a.address(), "mem://a");
        assert_eq!(b.address(), "mem://b");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_dial_does_not_block_other_addresses() {
        let registry = Arc::new(ConnectionRegistry::default());
        let connector = MemoryConnector::default();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let stalled = {
            let registry = Arc::clone(&registry);
            let connector = connector.clone();
            tokio::spawn(async move {
                registry
                    .acquire_with("mem://slow", |address| async move {
                        let _ = release_rx.await;
                        connector.connect(address).await
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            registry.acquire_with("mem://fast", |address| connector.connect(address)),
        )
        .await
        .expect("dial to another address must not wait")
        .expect("acquire");

        assert_eq!(fast.address(), "mem://fast");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("mem://slow").is_none());

        let _ = release_tx.send(());
        let slow = stalled.await.expect("task").expect("acquire");
        assert_eq!(slow.address(), "mem://slow");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_dial_lets_next_caller_retry() {
        let registry = ConnectionRegistry::default();
        let connector = MemoryConnector::default();

        let first = registry
            .acquire_with("mem://a", |_| async { Err(Error::connection("refused")) })
            .await;
        assert!(first.is_err());

        let second = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("acquire");
        assert!(second.is_alive());
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_dead_connection_is_returned_unchanged() {
        let registry = ConnectionRegistry::default();
        let connector = MemoryConnector::default();

        let first = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("acquire");
        first.shutdown();
        first.closed().await;

        let second = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("acquire");

        assert!(second.ptr_eq(&first));
        assert!(!second.is_alive());
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_no_entry() {
        let registry = ConnectionRegistry::default();

        let result = registry
            .acquire_with("mem://a", |_| async { Err(Error::connection("refused")) })
            .await;
        assert!(matches!(result, Err(Error::Connection { .. })));
        assert!(registry.is_empty());
        assert!(registry.get("mem://a").is_none());
    }

    #[tokio::test]
    async fn test_invalid_address_is_config_error() {
        let registry = ConnectionRegistry::default();
        let result = registry.acquire("http://127.0.0.1:8888").await;
        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_then_acquire_opens_fresh_connection() {
        let registry = ConnectionRegistry::default();
        let connector = MemoryConnector::default();

        let first = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("acquire");

        let removed = registry.remove("mem://a").expect("removed");
        assert!(removed.ptr_eq(&first));
        first.closed().await;

        let second = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("acquire");
        assert!(!second.ptr_eq(&first));
        assert!(second.is_alive());
        assert_eq!(connector.calls(), 2);
        assert!(registry.remove("mem://missing").is_none());
    }

    #[tokio::test]
    async fn test_close_shuts_everything_down() {
        let registry = ConnectionRegistry::default();
        let connector = MemoryConnector::default();

        let a = registry
            .acquire_with("mem://a", |address| connector.connect(address))
            .await
            .expect("a");
        let b = registry
            .acquire_with("mem://b", |address| connector.connect(address))
            .await
            .expect("b");

        registry.close().await;

        assert!(registry.is_closed());
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(registry.is_empty());
        assert!(matches!(
            registry
                .acquire_with("mem://a", |address| connector.connect(address))
                .await,
            Err(Error::RegistryClosed)
        ));
    }

    #[tokio::test]
    async fn test_acquire_over_websocket() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");

            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let request: Value = serde_json::from_str(text.as_str()).expect("json");
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "result": { "value": "pong", "sessionId": "s-1" },
                });
                ws.send(Message::Text(reply.to_string().into()))
                    .await
                    .expect("send");
            }
        });

        let registry = ConnectionRegistry::new(
            ConnectionOptions::new().with_connect_timeout(Duration::from_secs(5)),
        );
        let address = format!("ws://127.0.0.1:{port}");
        let connection = registry.acquire(&address).await?;

        let response = connection.call(Request::ping(1000)).await;
        assert!(response.is_success());
        assert_eq!(response.get_string("value"), "pong");
        assert_eq!(connection.session_id().as_deref(), Some("s-1"));

        let again = registry.acquire(&address).await?;
        assert!(again.ptr_eq(&connection));

        registry.close().await;
        server.await?;
        Ok(())
    }
}
