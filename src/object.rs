//! Handles to server-side objects.
//!
//! A [`RemoteObject`] pairs an object id with the connection it lives on and
//! wraps the generic lifecycle methods: `create`, `invoke`, `subscribe`,
//! `unsubscribe` and `release`. Typed per-entity wrappers are built on top
//! of it by higher layers.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = RemoteObject::create(&connection, "MediaPipeline", Map::new()).await?;
//! let player = pipeline
//!     .create_in("PlayerEndpoint", params(json!({ "uri": "file:///tmp/a.webm" })))
//!     .await?;
//!
//! player
//!     .subscribe("EndOfStream", |data: &Value| println!("done: {data}"))
//!     .await?;
//! player.invoke("play", Map::new()).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, ObjectId};
use crate::protocol::{Command, merge_options, set_if_not_empty};
use crate::transport::{Connection, EventHandler};

// ============================================================================
// RemoteObject
// ============================================================================

/// A server-side object reachable over a connection.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    connection: Connection,
    id: ObjectId,
}

// ============================================================================
// RemoteObject - Constructors
// ============================================================================

impl RemoteObject {
    /// Wraps an existing object id.
    #[must_use]
    pub fn new(connection: Connection, id: impl Into<ObjectId>) -> Self {
        Self {
            connection,
            id: id.into(),
        }
    }

    /// Creates an object of `type_name` on the server.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server rejects the call
    /// - [`Error::Protocol`] if the response carries no object id
    /// - [`Error::ConnectionClosed`] if the connection is dead
    pub async fn create(
        connection: &Connection,
        type_name: &str,
        constructor_params: Map<String, Value>,
    ) -> Result<Self> {
        let command = Command::Create {
            type_name: type_name.to_string(),
            constructor_params,
            properties: None,
        };

        let value = connection.call(command.into()).await.into_value()?;
        let id = value
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::protocol(format!("create {type_name} returned no object id")))?;

        debug!(type_name, object_id = id, "Remote object created");

        Ok(Self::new(connection.clone(), id))
    }

    /// Creates an object that belongs to this one.
    ///
    /// This object's id is passed as `mediaPipeline`; entries in `options`
    /// override it.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteObject::create`].
    pub async fn create_in(&self, type_name: &str, options: Map<String, Value>) -> Result<Self> {
        let mut constructor_params = Map::new();
        constructor_params.insert(
            "mediaPipeline".to_string(),
            Value::String(self.id.as_str().to_string()),
        );
        merge_options(&mut constructor_params, options);

        Self::create(&self.connection, type_name, constructor_params).await
    }
}

// ============================================================================
// RemoteObject - Accessors
// ============================================================================

impl RemoteObject {
    /// Returns the object id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the connection the object lives on.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

// ============================================================================
// RemoteObject - Operations
// ============================================================================

impl RemoteObject {
    /// Invokes `operation` and returns `result.value`.
    ///
    /// Null and empty-string params are not sent.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server rejects the call
    /// - [`Error::ConnectionClosed`] if the connection is dead
    /// - [`Error::RequestTimeout`] if the configured deadline expires
    pub async fn invoke(&self, operation: &str, params: Map<String, Value>) -> Result<Value> {
        let mut operation_params = Map::new();
        for (key, value) in params {
            set_if_not_empty(&mut operation_params, &key, value);
        }

        let command = Command::Invoke {
            object: self.id.clone(),
            operation: operation.to_string(),
            operation_params,
        };

        self.connection.call(command.into()).await.into_value()
    }

    /// Subscribes on the server, then registers `handler` locally under the
    /// returned subscription id.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server rejects the subscription
    /// - [`Error::Protocol`] if the response carries no subscription id
    pub async fn subscribe<H>(&self, event_type: &str, handler: H) -> Result<HandlerId>
    where
        H: EventHandler,
    {
        let command = Command::Subscribe {
            object: self.id.clone(),
            event_type: event_type.to_string(),
        };

        let value = self.connection.call(command.into()).await.into_value()?;
        let subscription = value
            .as_str()
            .filter(|id| !id.is_empty())
            .map(HandlerId::new)
            .ok_or_else(|| {
                Error::protocol(format!("subscribe {event_type} returned no subscription id"))
            })?;

        self.connection
            .subscribe(event_type, self.id.clone(), subscription.clone(), handler);

        Ok(subscription)
    }

    /// Cancels a subscription on the server and removes the local handler.
    ///
    /// The local handler is removed even when the server call fails.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server rejects the call
    /// - [`Error::ConnectionClosed`] if the connection is dead
    pub async fn unsubscribe(&self, event_type: &str, subscription: &HandlerId) -> Result<()> {
        self.connection
            .unsubscribe(event_type, &self.id, subscription);

        let command = Command::Unsubscribe {
            object: self.id.clone(),
            subscription: subscription.clone(),
        };

        self.connection
            .call(command.into())
            .await
            .into_result()
            .inspect_err(|e| {
                warn!(object_id = %self.id, subscription = %subscription, error = %e, "Server unsubscribe failed");
            })
            .map(drop)
    }

    /// Releases the object on the server.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server rejects the call
    /// - [`Error::ConnectionClosed`] if the connection is dead
    pub async fn release(&self) -> Result<()> {
        let command = Command::Release {
            object: self.id.clone(),
        };

        self.connection.call(command.into()).await.into_result()?;
        debug!(object_id = %self.id, "Remote object released");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::client::ConnectionOptions;
    use crate::transport::{MemoryPeer, memory_transport};

    fn spawn_connection() -> (Connection, MemoryPeer) {
        let (sink, source, peer) = memory_transport();
        let connection =
            Connection::spawn("mem://test", sink, source, &ConnectionOptions::default());
        (connection, peer)
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_reads_object_id_and_session() {
        let (connection, mut peer) = spawn_connection();

        let (object, ()) = tokio::join!(
            RemoteObject::create(&connection, "MediaPipeline", Map::new()),
            async {
                let sent = peer.next_request().await.expect("create");
                assert_eq!(sent["method"], "create");
                assert_eq!(sent["params"]["type"], "MediaPipeline");
                peer.respond(&sent, json!({ "value": "pipe-1", "sessionId": "s-1" }));
            }
        );

        let object = object.expect("create");
        assert_eq!(object.id().as_str(), "pipe-1");
        assert_eq!(connection.session_id().as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_create_without_id_is_protocol_error() {
        let (connection, mut peer) = spawn_connection();

        let (result, ()) = tokio::join!(
            RemoteObject::create(&connection, "MediaPipeline", Map::new()),
            async {
                let sent = peer.next_request().await.expect("create");
                peer.respond(&sent, json!({}));
            }
        );

        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_create_in_merges_options() {
        let (connection, mut peer) = spawn_connection();
        let pipeline = RemoteObject::new(connection.clone(), "pipe-1");

        let (child, ()) = tokio::join!(
            pipeline.create_in("PlayerEndpoint", params(json!({ "uri": "file:///a.webm" }))),
            async {
                let sent = peer.next_request().await.expect("create");
                let constructor = &sent["params"]["constructorParams"];
                assert_eq!(constructor["mediaPipeline"], "pipe-1");
                assert_eq!(constructor["uri"], "file:///a.webm");
                peer.respond(&sent, json!({ "value": "pipe-1/player-1" }));
            }
        );

        assert_eq!(child.expect("create").id().as_str(), "pipe-1/player-1");
    }

    #[tokio::test]
    async fn test_invoke_drops_empty_params() {
        let (connection, mut peer) = spawn_connection();
        let object = RemoteObject::new(connection, "obj-1");

        let (value, ()) = tokio::join!(
            object.invoke(
                "getTag",
                params(json!({ "key": "k", "empty": "", "missing": null }))
            ),
            async {
                let sent = peer.next_request().await.expect("invoke");
                assert_eq!(sent["params"]["object"], "obj-1");
                assert_eq!(sent["params"]["operation"], "getTag");
                assert_eq!(sent["params"]["operationParams"], json!({ "key": "k" }));
                peer.respond(&sent, json!({ "value": "v" }));
            }
        );

        assert_eq!(value.expect("invoke"), json!("v"));
    }

    #[tokio::test]
    async fn test_invoke_server_error() {
        let (connection, mut peer) = spawn_connection();
        let object = RemoteObject::new(connection, "obj-1");

        let (result, ()) = tokio::join!(object.invoke("explode", Map::new()), async {
            let sent = peer.next_request().await.expect("invoke");
            peer.respond_error(&sent, 40101, "Object not found");
        });

        match result {
            Err(Error::Rpc(error)) => assert_eq!(error.code, 40101),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_routes_events_until_unsubscribed() {
        let (connection, mut peer) = spawn_connection();
        let object = RemoteObject::new(connection.clone(), "obj-1");

        let count = Arc::new(AtomicUsize::new(0));
        let handler_count = Arc::clone(&count);

        let (subscription, ()) = tokio::join!(
            object.subscribe("EndOfStream", move |_: &Value| {
                handler_count.fetch_add(1, Ordering::SeqCst);
            }),
            async {
                let sent = peer.next_request().await.expect("subscribe");
                assert_eq!(sent["method"], "subscribe");
                assert_eq!(sent["params"]["type"], "EndOfStream");
                peer.respond(&sent, json!({ "value": "sub-1" }));
            }
        );
        let subscription = subscription.expect("subscribe");
        assert_eq!(subscription.as_str(), "sub-1");

        peer.emit("EndOfStream", "obj-1", json!({}));

        // The event is handled before the response that follows it.
        let (state, ()) = tokio::join!(object.invoke("getState", Map::new()), async {
            let sent = peer.next_request().await.expect("invoke");
            peer.respond(&sent, json!({ "value": "PLAYING" }));
        });
        assert_eq!(state.expect("invoke"), json!("PLAYING"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (result, ()) = tokio::join!(object.unsubscribe("EndOfStream", &subscription), async {
            let sent = peer.next_request().await.expect("unsubscribe");
            assert_eq!(sent["params"]["subscription"], "sub-1");
            peer.respond(&sent, json!({}));
        });
        result.expect("unsubscribe");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            connection.handler_count("EndOfStream", &ObjectId::new("obj-1")),
            0
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_locally_on_server_error() {
        let (connection, mut peer) = spawn_connection();
        let object = RemoteObject::new(connection.clone(), "obj-1");
        connection.subscribe("Foo", "obj-1", "sub-1", |_: &Value| {});
        let subscription = HandlerId::new("sub-1");

        let (result, ()) = tokio::join!(
            object.unsubscribe("Foo", &subscription),
            async {
                let sent = peer.next_request().await.expect("unsubscribe");
                peer.respond_error(&sent, 40106, "Subscription not found");
            }
        );

        assert!(matches!(result, Err(Error::Rpc(_))));
        assert_eq!(connection.handler_count("Foo", &ObjectId::new("obj-1")), 0);
    }

    #[tokio::test]
    async fn test_release_on_dead_connection() {
        let (connection, _peer) = spawn_connection();
        let object = RemoteObject::new(connection.clone(), "obj-1");

        connection.shutdown();
        connection.closed().await;

        assert!(matches!(object.release().await, Err(Error::ConnectionClosed)));
    }
}
