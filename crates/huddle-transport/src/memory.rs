//! In-memory connection pair.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] and the
//! [`MemoryPeer`] that plays the remote end. Frames travel over unbounded
//! channels, so nothing here ever blocks. Useful for driving connection
//! handlers in tests and for embedding without a socket.

use tokio::sync::mpsc;

use crate::{
    Connection, ConnectionId, Frame, FrameSink, FrameSource, TransportError,
};

/// Creates a connected server/peer pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let conn = MemoryConnection {
        id: ConnectionId::next(),
        outgoing: to_peer,
        incoming: from_peer,
    };
    let peer = MemoryPeer {
        to_server: Some(to_server),
        from_server,
    };
    (conn, peer)
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<Frame>,
    incoming: mpsc::UnboundedReceiver<Frame>,
}

impl Connection for MemoryConnection {
    type Sink = MemorySink;
    type Source = MemorySource;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (MemorySink, MemorySource) {
        (
            MemorySink {
                tx: Some(self.outgoing),
            },
            MemorySource { rx: self.incoming },
        )
    }
}

/// Write half of a [`MemoryConnection`].
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            TransportError::ConnectionClosed("sink already closed".into())
        })?;
        tx.send(frame).map_err(|_| {
            TransportError::ConnectionClosed("peer went away".into())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Read half of a [`MemoryConnection`].
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.rx.recv().await {
            Some(Frame::Close) | None => Ok(None),
            Some(frame) => Ok(Some(frame)),
        }
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    to_server: Option<mpsc::UnboundedSender<Frame>>,
    from_server: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Sends a frame to the server side. Returns `false` once the server
    /// has dropped its read half or the peer has hung up.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Sends a text frame to the server side.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Waits for the next frame written by the server side.
    ///
    /// Returns `None` once the server has closed its write half.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Returns the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }

    /// Stops sending. The server's read half observes a clean close.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }
}
