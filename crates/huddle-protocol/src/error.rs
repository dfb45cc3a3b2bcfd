//! Error types for the protocol layer.
//!
//! Each crate in Huddle defines its own error enum. A `ProtocolError`
//! always means the problem is in serialization, not in networking or
//! room membership.

/// Boxed cause, so any [`Codec`](crate::Codec) can report its own
/// library's errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning an envelope into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed (turning bytes into an envelope).
    ///
    /// Common causes: malformed JSON, a missing `type` field, or wrong
    /// field types.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),
}
