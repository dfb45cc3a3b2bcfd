//! Unified error type for the Huddle server.

use huddle_hub::HubError;
use huddle_protocol::ProtocolError;
use huddle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A hub-level error (hub stopped, timeouts, oversized frames).
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The upgrade request's token was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The upgrade request did not name a room under the server's prefix.
    #[error("bad upgrade path: {0}")]
    BadPath(String),
}
