//! Connection hub for Huddle.
//!
//! The hub runs as a single Tokio task (actor model) that exclusively
//! owns room membership. Connections never touch that state directly;
//! they talk to the hub through channels.
//!
//! # Key types
//!
//! - [`Hub`] / [`HubHandle`]: spawn the control loop, submit intake
//! - [`Client`]: attach an upgraded connection (read + write loops)
//! - [`ClientHandle`] / [`OutboundQueue`]: the two ends of a
//!   connection's bounded outbound queue
//! - [`ClientConfig`]: queue depth, keepalive timings, frame limit

mod client;
mod config;
mod error;
mod hub;

pub use client::{Client, ClientTasks};
pub use config::ClientConfig;
pub use error::HubError;
pub use hub::{
    ClientHandle, ClientKey, DEFAULT_INBOUND_CAPACITY, Hub, HubHandle, HubStats,
    OutboundQueue,
};
