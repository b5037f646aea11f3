//! Transport socket abstraction and its WebSocket implementation.
//!
//! A transport is split into a write half ([`MessageSink`]) and a read half
//! ([`MessageSource`]). The connection's event loop owns both halves: it
//! serializes all writes and is the only reader.
//!
//! Any failure from either half is fatal to the connection.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream as returned by `connect_async`.
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a client WebSocket.
pub type WsSink<S = MaybeTlsStream<TcpStream>> = SplitSink<WebSocketStream<S>, Message>;

/// Read half of a client WebSocket.
pub type WsSource<S = MaybeTlsStream<TcpStream>> = SplitStream<WebSocketStream<S>>;

// ============================================================================
// Traits
// ============================================================================

/// Write half of a message-oriented transport.
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Sends one text message.
    ///
    /// # Errors
    ///
    /// Any error means the transport can no longer be written to.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Closes the write half.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error; callers treat it as informational.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read half of a message-oriented transport.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Receives the next text message.
    ///
    /// Must be cancel safe: the event loop drops this future whenever an
    /// outgoing request wins the race, and no message may be lost.
    ///
    /// # Errors
    ///
    /// Any error (including orderly close) means the transport is dead.
    async fn receive_next(&mut self) -> Result<String>;
}

// ============================================================================
// WebSocket Implementation
// ============================================================================

#[async_trait]
impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        SinkExt::close(self).await?;
        Ok(())
    }
}

#[async_trait]
impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive_next(&mut self) -> Result<String> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Err(Error::ConnectionClosed);
                }

                Some(Err(e)) => return Err(Error::WebSocket(e)),

                None => {
                    debug!("WebSocket stream ended");
                    return Err(Error::ConnectionClosed);
                }

                // Binary, Ping, Pong, Frame
                Some(Ok(other)) => {
                    trace!(len = other.len(), "Ignoring non-text WebSocket message");
                }
            }
        }
    }
}

// ============================================================================
// Connect
// ============================================================================

/// Resolves a server address into the WebSocket URL to dial.
///
/// The address must be a `ws://` or `wss://` URL. When it carries no path,
/// `default_path` is appended.
///
/// # Errors
///
/// - [`Error::Config`] if the address is not a WebSocket URL
pub fn resolve_url(address: &str, default_path: &str) -> Result<Url> {
    let mut url = Url::parse(address)
        .map_err(|e| Error::config(format!("Invalid server address '{address}': {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::config(format!(
            "Server address '{address}' must use ws:// or wss://"
        )));
    }

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(default_path);
    }

    Ok(url)
}

/// Opens a WebSocket to `url` and splits it into its two halves.
///
/// # Errors
///
/// - [`Error::ConnectionTimeout`] if the handshake does not finish in time
/// - [`Error::Connection`] if the TCP connect or WebSocket handshake fails
pub async fn connect(url: &Url, connect_timeout: Duration) -> Result<(WsSink, WsSource)> {
    debug!(%url, "Opening WebSocket");

    let (stream, _response) = timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| Error::connection_timeout(saturating_millis(connect_timeout)))?
        .map_err(|e| Error::connection(format!("WebSocket connect to {url} failed: {e}")))?;

    info!(%url, "WebSocket connection established");

    Ok(split(stream))
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Splits an established WebSocket stream into transport halves.
#[must_use]
pub fn split<S>(stream: WebSocketStream<S>) -> (WsSink<S>, WsSource<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.split()
}

// ============================================================================
// Tests
// ============================================================================
