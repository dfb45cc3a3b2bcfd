//! Wire protocol for Huddle.
//!
//! This crate defines what travels between chat clients and the hub:
//!
//! - **Types** ([`Envelope`], [`MessageKind`], [`RoomKey`], [`UserId`]):
//!   the unit of routed content and the keys it is routed by.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (frames) and the hub
//! (membership and fan-out). It doesn't know about connections or
//! rooms as live objects; it only knows how to name them and how to
//! serialize what is sent to them.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Hub (rooms)
//! ```

mod codec;
mod envelope;
mod error;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use envelope::{Envelope, MessageKind, RoomKey, UserId};
pub use error::{BoxError, ProtocolError};
