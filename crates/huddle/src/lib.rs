//! # Huddle
//!
//! Real-time chat over WebSockets, built around a single-owner
//! connection hub.
//!
//! Clients connect to `ws://host{prefix}/{room}?token=...`. The server
//! authenticates the token through your [`Authenticator`], then attaches
//! the connection to the hub, which fans every `message` out to the
//! room and every `notification` to its recipient's room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::prelude::*;
//!
//! struct DevAuth;
//!
//! impl Authenticator for DevAuth {
//!     async fn authenticate(&self, token: &str) -> Result<UserId, HuddleError> {
//!         Ok(UserId::new(token))
//!     }
//! }
//!
//! # async fn start() -> Result<(), HuddleError> {
//! let server = ChatServer::<DevAuth>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(DevAuth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::Authenticator;
pub use config::{DEFAULT_BIND_ADDR, DEFAULT_PATH_PREFIX, ServerConfig};
pub use error::HuddleError;
pub use server::{ChatServer, ChatServerBuilder};

pub use huddle_hub as hub;
pub use huddle_protocol as protocol;
pub use huddle_transport as transport;

/// Everything needed to stand up a server.
pub mod prelude {
    pub use crate::{
        Authenticator, ChatServer, ChatServerBuilder, HuddleError,
        ServerConfig,
    };
    pub use huddle_hub::{ClientConfig, HubHandle, HubStats};
    pub use huddle_protocol::{Envelope, MessageKind, RoomKey, UserId};
}
