//! WebSocket transport implementation using `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{
    Connection, ConnectionId, Frame, FrameSink, FrameSource, Transport,
    TransportError, UpgradeRequest,
};

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
        })
    }

    /// Caps the size of a single inbound message and frame.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.config.max_message_size = Some(max);
        self.config.max_frame_size = Some(max);
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(
        &mut self,
    ) -> Result<(WebSocketConnection, UpgradeRequest), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let mut upgrade = UpgradeRequest::default();
        let callback = |req: &Request,
                        resp: Response|
         -> Result<Response, ErrorResponse> {
            upgrade.path = req.uri().path().to_owned();
            upgrade.query = req.uri().query().map(str::to_owned);
            Ok(resp)
        };

        let ws = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            callback,
            Some(self.config),
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, path = %upgrade.path, "accepted WebSocket connection");

        Ok((WebSocketConnection { id, ws }, upgrade))
    }
}

/// A single upgraded WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    type Sink = WebSocketSink;
    type Source = WebSocketSource;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (WebSocketSink, WebSocketSource) {
        let (sink, stream) = self.ws.split();
        (WebSocketSink { sink }, WebSocketSource { stream })
    }
}

/// Write half of a [`WebSocketConnection`].
pub struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        };
        self.sink.send(msg).await.map_err(send_failed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(send_failed(e)),
        }
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketSource {
    stream: SplitStream<WsStream>,
}

impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    Frame::Text(text.as_str().to_owned())
                }
                Some(Ok(Message::Binary(data))) => Frame::Binary(data.to_vec()),
                Some(Ok(Message::Ping(data))) => Frame::Ping(data.to_vec()),
                Some(Ok(Message::Pong(data))) => Frame::Pong(data.to_vec()),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Frame(_))) => continue, // raw frames never surface when reading
                Some(Err(WsError::Capacity(
                    CapacityError::MessageTooLong { size, max_size },
                ))) => {
                    return Err(TransportError::FrameTooLarge {
                        size,
                        max: max_size,
                    });
                }
                Some(Err(WsError::ConnectionClosed)) => return Ok(None),
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            };
            return Ok(Some(frame));
        }
    }
}

fn send_failed(e: WsError) -> TransportError {
    TransportError::SendFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        e,
    ))
}
