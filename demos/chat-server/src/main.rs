//! Development chat server.
//!
//! ```text
//! HUDDLE_ADDR=0.0.0.0:8080 RUST_LOG=debug cargo run -p chat-server
//! ```
//!
//! Connect with any WebSocket client to
//! `ws://127.0.0.1:8080/ws/{room}?token={name}`. The token is taken as
//! the user name, so this is for local use only.

use huddle::prelude::*;
use tracing_subscriber::EnvFilter;

/// Accepts any token made of `[A-Za-z0-9_-]` as the user name.
struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, HuddleError> {
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(HuddleError::AuthFailed(format!(
                "invalid user name {token:?}"
            )));
        }
        Ok(UserId::new(token))
    }
}

fn server_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("HUDDLE_ADDR") {
        config.bind_addr = addr;
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = ChatServer::<DevAuthenticator>::builder()
        .config(server_config())
        .build(DevAuthenticator)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "chat server ready");
    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    #[tokio::test]
    async fn test_dev_authenticator() {
        let auth = DevAuthenticator;
        assert_eq!(auth.authenticate("alice_01").await.unwrap(), UserId::new("alice_01"));
        assert!(auth.authenticate("").await.is_err());
        assert!(auth.authenticate("a b").await.is_err());
    }

    #[tokio::test]
    async fn test_two_users_chat_in_a_room() {
        let server = ChatServer::<DevAuthenticator>::builder()
            .bind("127.0.0.1:0")
            .build(DevAuthenticator)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let hub = server.hub();
        tokio::spawn(server.run());

        let url = |name: &str| format!("ws://{addr}/ws/lobby?token={name}");
        let (mut alice, _) = tokio_tungstenite::connect_async(url("alice")).await.unwrap();
        let (mut bob, _) = tokio_tungstenite::connect_async(url("bob")).await.unwrap();

        for _ in 0..200 {
            if hub.stats().await.unwrap().connections == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let hello = r#"{"type":"message","content":"hello bob"}"#;
        alice.send(Message::Text(hello.to_string().into())).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), bob.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&msg.into_data()).unwrap();
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["id"], "lobby");
        assert_eq!(json["content"], "hello bob");
    }
}
