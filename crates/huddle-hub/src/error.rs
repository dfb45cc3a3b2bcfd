//! Error types for the hub layer.

use std::time::Duration;

use huddle_protocol::ProtocolError;
use huddle_transport::TransportError;

/// Errors that can occur in the hub or a connection adapter.
///
/// Apart from [`HubError::HubStopped`], every variant is connection-local:
/// it ends one connection's loops and is logged, never propagated into
/// the hub's control loop.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub's control loop is no longer running.
    #[error("hub is not running")]
    HubStopped,

    /// Reading or writing the underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An inbound frame did not decode into an envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No pong arrived before the read deadline.
    #[error("no pong within {0:?}")]
    ReadTimeout(Duration),

    /// A frame could not be written before the write deadline.
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    /// The peer sent a frame larger than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}
