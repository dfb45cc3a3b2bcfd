//! The routed unit of chat content and the keys it is routed by.
//!
//! Every application frame on the wire is one [`Envelope`] encoded by the
//! codec. On the wire it looks like:
//!
//! ```text
//! { "type": "message" | "notification",
//!   "sender": "<user-id>",
//!   "recipient": "<user-id-or-room-id>",
//!   "content": "<string>",
//!   "id": "<room-id-or-correlation-id>" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The key of a room: the group of connections that receive the same
/// broadcast.
///
/// `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity of an authenticated user.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// What an envelope is for, and therefore how its room is resolved.
///
/// Unrecognised `type` values decode to [`MessageKind::Unknown`] instead
/// of failing, so a newer client cannot knock an older server's
/// connection over; the hub drops such envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Broadcast to the room named by the envelope's `id`.
    Message,
    /// Targeted delivery to the room named by the envelope's `recipient`.
    Notification,
    /// Anything else.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Notification => f.write_str("notification"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One unit of routed content.
///
/// Fields are private: an envelope is frozen once built. The consuming
/// `with_*`/`stamped` methods return a new value, and the hub shares the
/// final value between recipients behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,

    #[serde(default)]
    sender: UserId,

    #[serde(default)]
    recipient: String,

    #[serde(default)]
    content: String,

    /// Room id for `message`, correlation id for `notification`.
    #[serde(default)]
    id: String,
}

impl Envelope {
    /// Builds a room broadcast.
    pub fn message(
        room: RoomKey,
        sender: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Message,
            sender,
            recipient: room.0.clone(),
            content: content.into(),
            id: room.0,
        }
    }

    /// Builds a targeted notification.
    pub fn notification(
        recipient: RoomKey,
        sender: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Notification,
            sender,
            recipient: recipient.0,
            content: content.into(),
            id: String::new(),
        }
    }

    /// Replaces the `id` field.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Binds an inbound envelope to the connection it arrived on.
    ///
    /// The sender is always overwritten with the connection's user. A
    /// `message` that names no room is addressed to `home`.
    pub fn stamped(mut self, sender: &UserId, home: &RoomKey) -> Self {
        self.sender = sender.clone();
        if self.kind == MessageKind::Message && self.id.is_empty() {
            self.id = home.0.clone();
        }
        self
    }

    /// Resolves the room this envelope is routed to.
    ///
    /// Returns `None` for unknown kinds and for an empty key.
    pub fn room_key(&self) -> Option<RoomKey> {
        let key = match self.kind {
            MessageKind::Message => &self.id,
            MessageKind::Notification => &self.recipient,
            MessageKind::Unknown => return None,
        };
        (!key.is_empty()).then(|| RoomKey(key.clone()))
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
