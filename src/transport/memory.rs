//! In-memory transport for tests and benchmarks.
//!
//! [`memory_transport`] returns the two halves a connection needs plus a
//! [`MemoryPeer`] that plays the server: it sees every message the client
//! wrote, can push arbitrary messages, and can break either direction.
//!
//! # Example
//!
//! ```ignore
//! let (sink, source, mut peer) = memory_transport();
//! let connection = Connection::spawn("mem://test", sink, source, &ConnectionOptions::default());
//!
//! let pending = connection.request(Request::ping(1000));
//! let sent = peer.next_request().await.unwrap();
//! peer.respond(&sent, json!({ "value": "pong" }));
//! assert!(pending.await.is_success());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::Event;

use super::socket::{MessageSink, MessageSource};

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected in-memory transport.
#[must_use]
pub fn memory_transport() -> (MemorySink, MemorySource, MemoryPeer) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));

    (
        MemorySink {
            tx: outgoing_tx,
            fail_writes: Arc::clone(&fail_writes),
        },
        MemorySource { rx: incoming_rx },
        MemoryPeer {
            outgoing: outgoing_rx,
            incoming: Some(incoming_tx),
            fail_writes,
        },
    )
}

// ============================================================================
// MemorySink / MemorySource
// ============================================================================

/// Client write half.
#[derive(Debug)]
pub struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.tx.send(text).map_err(|_| Error::ConnectionClosed)
    }
}

/// Client read half.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn receive_next(&mut self) -> Result<String> {
        self.rx.recv().await.ok_or(Error::ConnectionClosed)
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// The server side of an in-memory transport.
#[derive(Debug)]
pub struct MemoryPeer {
    outgoing: mpsc::UnboundedReceiver<String>,
    incoming: Option<mpsc::UnboundedSender<String>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Waits for the next message the client wrote, decoded as JSON.
    ///
    /// Returns `None` once the client's write half is gone.
    pub async fn next_request(&mut self) -> Option<Value> {
        loop {
            let text = self.outgoing.recv().await?;
            if let Ok(value) = serde_json::from_str(&text) {
                return Some(value);
            }
        }
    }

    /// Returns the next written message if one is already queued.
    pub fn try_next_request(&mut self) -> Option<Value> {
        let text = self.outgoing.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Pushes a raw text message to the client.
    ///
    /// Returns `false` if the client's read half is gone or the peer closed.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.incoming
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Pushes a JSON message to the client.
    pub fn push_json(&self, value: &Value) -> bool {
        self.push(value.to_string())
    }

    /// Answers `request` with a success result.
    pub fn respond(&self, request: &Value, result: Value) -> bool {
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": result,
        }))
    }

    /// Answers `request` with an error payload.
    pub fn respond_error(&self, request: &Value, code: i64, message: &str) -> bool {
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message },
        }))
    }

    /// Pushes an `onEvent` notification.
    pub fn emit(&self, event_type: &str, object: &str, data: Value) -> bool {
        let event = Event::new(event_type, object, data);
        match serde_json::to_value(&event) {
            Ok(value) => self.push_json(&value),
            Err(_) => false,
        }
    }

    /// Closes the server-to-client direction; the client's next read fails.
    pub fn close(&mut self) {
        self.incoming = None;
    }

    /// Makes every subsequent client write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_writes_reach_peer() {
        let (mut sink, _source, mut peer) = memory_transport();

        sink.send_text(r#"{"id":1}"#.into()).await.expect("send");
        assert_eq!(peer.next_request().await, Some(json!({ "id": 1 })));
        assert_eq!(peer.try_next_request(), None);
    }

    #[tokio::test]
    async fn test_peer_pushes_reach_client() {
        let (_sink, mut source, peer) = memory_transport();

        assert!(peer.respond(&json!({ "id": 4 }), json!({ "value": 1 })));
        let text = source.receive_next().await.expect("recv");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["id"], 4);
        assert_eq!(value["result"]["value"], 1);
    }

    #[tokio::test]
    async fn test_close_fails_reads() {
        let (_sink, mut source, mut peer) = memory_transport();
        peer.close();

        assert!(matches!(
            source.receive_next().await,
            Err(Error::ConnectionClosed)
        ));
        assert!(!peer.push("late"));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let (mut sink, _source, peer) = memory_transport();
        peer.fail_writes();

        assert!(sink.send_text("x".into()).await.is_err());
    }
}
