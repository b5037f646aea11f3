//! Multiplexed connection and event loop.
//!
//! One [`Connection`] owns one transport. Any number of tasks may issue
//! requests and manage subscriptions concurrently; a single spawned event
//! loop owns the transport and:
//!
//! - writes queued requests, one at a time
//! - correlates responses to pending requests by id
//! - adopts the server-assigned session token (first one wins)
//! - routes `onEvent` notifications to handlers keyed by
//!   `(event type, object id, handler id)`
//!
//! # Liveness
//!
//! A connection is alive until the first transport read or write failure,
//! an explicit [`Connection::shutdown`], or the last handle being dropped.
//! The transition to dead happens exactly once: every request still waiting
//! is resolved with the synthetic connection-lost response, and every later
//! request resolves to it immediately without touching the transport.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

use crate::client::ConnectionOptions;
use crate::error::Result;
use crate::identifiers::{HandlerId, ObjectId, RequestId};
use crate::protocol::{Event, Incoming, Request, Response, RpcError, classify};

use super::socket::{MessageSink, MessageSource, connect, resolve_url, saturating_millis};

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to completion slots.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Response>>;

/// Handlers registered under one `(event type, object)` key.
type HandlerMap = FxHashMap<HandlerId, Arc<dyn EventHandler>>;

/// Event type → object id → handler id → handler.
type SubscriptionTable = FxHashMap<String, FxHashMap<ObjectId, HandlerMap>>;

// ============================================================================
// EventHandler
// ============================================================================

/// Receives the `data` payload of matching events.
///
/// Handlers run on the event loop task; a slow handler delays every other
/// message on the connection. Handlers registered under the same key are
/// invoked in no particular order.
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event payload.
    fn on_event(&self, data: &Value);
}

impl<F> EventHandler for F
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    fn on_event(&self, data: &Value) {
        self(data);
    }
}

// ============================================================================
// Liveness
// ============================================================================

/// Transport status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Requests are being sent and answered.
    Alive,
    /// The transport failed or was shut down; irreversible.
    Dead,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a request whose completion slot is already registered.
    Send { id: RequestId, request: Request },
    /// Close the transport and stop.
    Shutdown,
}

// ============================================================================
// Shared State
// ============================================================================

/// Id allocation, pending table and liveness, guarded together so that
/// allocation + registration is atomic relative to the loop's lookups.
struct State {
    next_id: u64,
    pending: CorrelationMap,
    liveness: Liveness,
}

/// State shared between connection handles and the event loop.
struct Shared {
    address: String,
    state: Mutex<State>,
    session_id: RwLock<Option<String>>,
    subscriptions: RwLock<SubscriptionTable>,
    dead_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Transitions to dead and resolves every pending request.
    ///
    /// Returns `false` if the connection was already dead.
    fn mark_dead(&self, reason: &'static str) -> bool {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.liveness == Liveness::Dead {
                return false;
            }
            state.liveness = Liveness::Dead;
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (id, tx) in drained {
            let _ = tx.send(Response::connection_lost(Some(id)));
        }

        self.dead_tx.send_replace(true);
        warn!(address = %self.address, reason, failed = count, "Connection dead");
        true
    }

    /// Completes one pending request, if it is still waiting.
    fn complete(&self, id: RequestId, response: Response) -> bool {
        let tx = self.state.lock().pending.remove(&id);
        match tx {
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Removes a pending request without completing it.
    fn release(&self, id: RequestId) -> bool {
        self.state.lock().pending.remove(&id).is_some()
    }

    fn handle_incoming_message(&self, text: &str) {
        trace!(address = %self.address, len = text.len(), "Message received");

        match classify(text) {
            Ok(Incoming::Response(response)) => self.handle_response(response),
            Ok(Incoming::Event(event)) => self.dispatch(&event),
            Ok(Incoming::Unsupported(_)) => {
                warn!(address = %self.address, text = %text, "Unsupported message");
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, text = %text, "Failed to decode message");
            }
        }
    }

    fn handle_response(&self, response: Response) {
        if let Some(session_id) = response.session_id() {
            let mut current = self.session_id.write();
            if current.is_none() {
                debug!(address = %self.address, session_id, "Session assigned");
                *current = Some(session_id.to_string());
            }
        }

        let Some(id) = response.id else {
            return;
        };

        if !self.complete(id, response) {
            debug!(address = %self.address, request_id = %id, "Dropped response for unknown request");
        }
    }

    fn dispatch(&self, event: &Event) {
        let handlers: Vec<(HandlerId, Arc<dyn EventHandler>)> = {
            let subscriptions = self.subscriptions.read();
            subscriptions
                .get(event.event_type())
                .and_then(|by_object| by_object.get(event.object()))
                .map(|handlers| {
                    handlers
                        .iter()
                        .map(|(id, handler)| (id.clone(), Arc::clone(handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        trace!(
            event_type = event.event_type(),
            object_id = %event.object(),
            handlers = handlers.len(),
            "Dispatching event"
        );

        for (handler_id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler.on_event(event.data()))).is_err() {
                error!(
                    event_type = event.event_type(),
                    object_id = %event.object(),
                    handler_id = %handler_id,
                    "Event handler panicked"
                );
            }
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A multiplexed JSON-RPC connection.
///
/// Cloning is cheap and yields another handle to the same connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. Only [`PendingResponse`] awaits; every
/// other operation is non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
    /// Deadline applied by [`Connection::call`].
    request_timeout: Option<Duration>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            shared: Arc::clone(&self.shared),
            request_timeout: self.request_timeout,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.shared.address)
            .field("liveness", &self.liveness())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection over an open transport and spawns its event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<K, R>(
        address: impl Into<String>,
        sink: K,
        source: R,
        options: &ConnectionOptions,
    ) -> Self
    where
        K: MessageSink,
        R: MessageSource,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (dead_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            address: address.into(),
            state: Mutex::new(State {
                next_id: 0,
                pending: CorrelationMap::default(),
                liveness: Liveness::Alive,
            }),
            session_id: RwLock::new(None),
            subscriptions: RwLock::new(SubscriptionTable::default()),
            dead_tx,
            task: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::run_event_loop(
            Arc::clone(&shared),
            sink,
            source,
            command_rx,
        ));
        *shared.task.lock() = Some(handle);

        debug!(address = %shared.address, "Connection created");

        Self {
            command_tx,
            shared,
            request_timeout: options.request_timeout,
        }
    }
}

impl Connection {
    /// Opens a WebSocket to `address` and spawns a connection over it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the address is not a WebSocket URL
    /// - [`Error::ConnectionTimeout`](crate::Error::ConnectionTimeout) if the handshake times out
    /// - [`Error::Connection`](crate::Error::Connection) if the connect fails
    pub async fn connect(address: &str, options: &ConnectionOptions) -> Result<Self> {
        let url = resolve_url(address, &options.endpoint_path)?;
        let (sink, source) = connect(&url, options.connect_timeout).await?;
        Ok(Self::spawn(address, sink, source, options))
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the remote address this connection was created for.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// Returns the current liveness.
    #[inline]
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.shared.state.lock().liveness
    }

    /// Returns `true` while the transport is usable.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness() == Liveness::Alive
    }

    /// Returns the session token assigned by the server, if any.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.read().clone()
    }

    /// Returns the number of requests waiting for a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Returns `true` if both handles refer to the same connection.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

// ============================================================================
// Connection - Requests
// ============================================================================

impl Connection {
    /// Sends a request and returns a handle resolving to its response.
    ///
    /// The handle always resolves: to the server's response, or to a
    /// synthetic error response (see [`RpcError::CONNECTION_LOST`]).
    pub fn request(&self, mut request: Request) -> PendingResponse {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut state = self.shared.state.lock();
            if state.liveness == Liveness::Dead {
                trace!(address = %self.shared.address, method = %request.method, "Request on dead connection");
                return PendingResponse::ready(Response::connection_lost(None));
            }
            state.next_id += 1;
            let id = RequestId::new(state.next_id);
            state.pending.insert(id, tx);
            id
        };

        request.id = Some(id);
        if let Some(session_id) = self.session_id() {
            request.stamp_session(&session_id);
        }

        trace!(address = %self.shared.address, request_id = %id, method = %request.method, "Request queued");

        if self
            .command_tx
            .send(ConnectionCommand::Send { id, request })
            .is_err()
        {
            self.shared.mark_dead("event loop stopped");
        }

        PendingResponse {
            id: Some(id),
            rx,
            shared: Some(Arc::clone(&self.shared)),
            done: false,
        }
    }

    /// Sends a request and waits for its response.
    ///
    /// Applies the configured request timeout, if any.
    pub async fn call(&self, request: Request) -> Response {
        let pending = self.request(request);
        match self.request_timeout {
            Some(request_timeout) => pending.timeout(request_timeout).await,
            None => pending.await,
        }
    }

    /// Sends a request and waits at most `request_timeout` for its response.
    pub async fn call_with_timeout(&self, request: Request, request_timeout: Duration) -> Response {
        self.request(request).timeout(request_timeout).await
    }
}

// ============================================================================
// Connection - Subscriptions
// ============================================================================

impl Connection {
    /// Registers `handler` for events of `event_type` from `object_id`.
    ///
    /// Registering again with the same three keys replaces the handler.
    pub fn subscribe<H>(
        &self,
        event_type: impl Into<String>,
        object_id: impl Into<ObjectId>,
        handler_id: impl Into<HandlerId>,
        handler: H,
    ) where
        H: EventHandler,
    {
        let event_type = event_type.into();
        let object_id = object_id.into();
        let handler_id = handler_id.into();

        debug!(
            address = %self.shared.address,
            event_type = %event_type,
            object_id = %object_id,
            handler_id = %handler_id,
            "Subscribed"
        );

        self.shared
            .subscriptions
            .write()
            .entry(event_type)
            .or_default()
            .entry(object_id)
            .or_default()
            .insert(handler_id, Arc::new(handler));
    }

    /// Registers `handler` under a freshly generated handler id.
    pub fn on_event<H>(
        &self,
        event_type: impl Into<String>,
        object_id: impl Into<ObjectId>,
        handler: H,
    ) -> HandlerId
    where
        H: EventHandler,
    {
        let handler_id = HandlerId::generate();
        self.subscribe(event_type, object_id, handler_id.clone(), handler);
        handler_id
    }

    /// Removes a handler. Returns `false` if nothing was registered.
    pub fn unsubscribe(&self, event_type: &str, object_id: &ObjectId, handler_id: &HandlerId) -> bool {
        let removed = self
            .shared
            .subscriptions
            .write()
            .get_mut(event_type)
            .and_then(|by_object| by_object.get_mut(object_id))
            .and_then(|handlers| handlers.remove(handler_id))
            .is_some();

        debug!(
            address = %self.shared.address,
            event_type,
            object_id = %object_id,
            handler_id = %handler_id,
            removed,
            "Unsubscribed"
        );

        removed
    }

    /// Returns the number of handlers registered under a key.
    #[must_use]
    pub fn handler_count(&self, event_type: &str, object_id: &ObjectId) -> usize {
        self.shared
            .subscriptions
            .read()
            .get(event_type)
            .and_then(|by_object| by_object.get(object_id))
            .map_or(0, FxHashMap::len)
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Asks the event loop to close the transport and stop.
    ///
    /// Requests still waiting resolve with the connection-lost response.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Waits until the connection is dead.
    pub async fn closed(&self) {
        let mut rx = self.shared.dead_tx.subscribe();
        let _ = rx.wait_for(|dead| *dead).await;
    }

    /// Waits for the event loop task to finish.
    ///
    /// Only the first caller waits; later calls return immediately.
    pub async fn join(&self) {
        let handle = self.shared.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(address = %self.shared.address, error = %e, "Event loop task failed");
        }
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

impl Connection {
    /// Event loop that owns the transport.
    async fn run_event_loop<K, R>(
        shared: Arc<Shared>,
        mut sink: K,
        mut source: R,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) where
        K: MessageSink,
        R: MessageSource,
    {
        loop {
            tokio::select! {
                // Incoming messages from the server
                message = source.receive_next() => {
                    match message {
                        Ok(text) => shared.handle_incoming_message(&text),
                        Err(e) => {
                            warn!(address = %shared.address, error = %e, "Transport read failed");
                            shared.mark_dead("read failure");
                            break;
                        }
                    }
                }

                // Commands from connection handles
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { id, request }) => {
                            if !Self::handle_send_command(&shared, &mut sink, id, request).await {
                                break;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(address = %shared.address, "Shutdown command received");
                            let _ = sink.close().await;
                            shared.mark_dead("shutdown");
                            break;
                        }

                        None => {
                            debug!(address = %shared.address, "Command channel closed");
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
            }
        }

        shared.mark_dead("event loop terminated");

        debug!(address = %shared.address, "Event loop terminated");
    }

    /// Writes one request. Returns `false` if the transport failed.
    async fn handle_send_command<K>(
        shared: &Shared,
        sink: &mut K,
        id: RequestId,
        request: Request,
    ) -> bool
    where
        K: MessageSink,
    {
        let json = match to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                warn!(address = %shared.address, request_id = %id, error = %e, "Failed to encode request");
                shared.complete(id, Response::failure(Some(id), RpcError::encode_failed(e.to_string())));
                return true;
            }
        };

        if let Err(e) = sink.send_text(json).await {
            warn!(address = %shared.address, request_id = %id, error = %e, "Transport write failed");
            shared.mark_dead("write failure");
            return false;
        }

        trace!(address = %shared.address, request_id = %id, "Request sent");
        true
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Completion handle for one request.
///
/// Resolves exactly once. Dropping an unresolved handle releases the
/// request's slot; a response arriving later is discarded.
#[must_use = "a PendingResponse does nothing unless awaited"]
pub struct PendingResponse {
    id: Option<RequestId>,
    rx: oneshot::Receiver<Response>,
    shared: Option<Arc<Shared>>,
    done: bool,
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    /// A handle that is already resolved.
    fn ready(response: Response) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(response);
        Self {
            id: None,
            rx,
            shared: None,
            done: false,
        }
    }

    /// Returns the allocated request id; `None` on the dead-connection fast path.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        self.id
    }

    /// Waits at most `duration` for the response.
    ///
    /// On expiry the request's slot is released and the synthetic
    /// [`RpcError::REQUEST_TIMEOUT`] response is returned.
    pub async fn timeout(mut self, duration: Duration) -> Response {
        if let Ok(response) = timeout(duration, &mut self).await {
            return response;
        }

        let released = match (&self.shared, self.id) {
            (Some(shared), Some(id)) => shared.release(id),
            _ => false,
        };

        if released {
            self.done = true;
            let timeout_ms = saturating_millis(duration);
            debug!(request_id = ?self.id, timeout_ms, "Request timed out");
            return Response::failure(self.id, RpcError::request_timeout(timeout_ms));
        }

        // Completed concurrently with the deadline; the response is in flight.
        (&mut self).await
    }
}

impl Future for PendingResponse {
    type Output = Response;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Response> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(response)) => {
                this.done = true;
                Poll::Ready(response)
            }
            Poll::Ready(Err(_)) => {
                this.done = true;
                Poll::Ready(Response::connection_lost(this.id))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.done
            && let (Some(shared), Some(id)) = (&self.shared, self.id)
            && shared.release(id)
        {
            trace!(request_id = %id, "Abandoned request released");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
