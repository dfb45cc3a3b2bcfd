//! Transport abstraction layer for Huddle.
//!
//! Provides the [`Connection`], [`FrameSink`], and [`FrameSource`] traits
//! that abstract over an already-upgraded, message-framed duplex
//! connection. A connection is split into an independent write half and
//! read half so that two tasks can drive it at the same time.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConnection, WebSocketSink, WebSocketSource, WebSocketTransport,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One discrete unit on the wire.
///
/// Data frames carry application payloads; `Ping`, `Pong`, and `Close`
/// are protocol-level control frames used for keepalive and shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Returns the payload length in bytes. Control frames without a
    /// payload report zero.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => {
                data.len()
            }
            Self::Close => 0,
        }
    }

    /// Returns `true` if the frame carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for ping, pong, and close frames.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_) | Self::Close)
    }
}

/// Accepts new incoming connections and performs the protocol upgrade.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for the next incoming connection, upgrades it, and returns
    /// it together with the request target that was upgraded.
    fn accept(
        &mut self,
    ) -> impl Future<
        Output = Result<(Self::Connection, UpgradeRequest), TransportError>,
    > + Send;
}

/// The request target of an upgraded connection, as seen during the
/// handshake. Routing on it is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpgradeRequest {
    /// The request path, e.g. `/ws/general`.
    pub path: String,
    /// The raw query string without the leading `?`, if any.
    pub query: Option<String>,
}

impl UpgradeRequest {
    /// Returns the value of the first query parameter named `key`.
    ///
    /// No percent-decoding is applied.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }
}

/// An upgraded connection that can be split into independent halves.
pub trait Connection: Send + 'static {
    /// The write half.
    type Sink: FrameSink;
    /// The read half.
    type Source: FrameSource;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Splits the connection into its write and read halves.
    ///
    /// The underlying connection is released once both halves are
    /// dropped.
    fn split(self) -> (Self::Sink, Self::Source);
}

/// The write half of a connection.
pub trait FrameSink: Send + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Flushes and closes the write half.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The read half of a connection.
pub trait FrameSource: Send + 'static {
    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;
}
