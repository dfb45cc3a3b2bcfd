//! `ChatServer` builder and accept loop.
//!
//! This is the entry point for running a Huddle server. It ties the
//! layers together: WebSocket transport → admission → hub.

use std::sync::Arc;

use huddle_hub::{ClientConfig, Hub, HubHandle};
use huddle_transport::{Transport, WebSocketTransport};

use crate::handler::admit;
use crate::{Authenticator, HuddleError, ServerConfig};

/// Shared state passed to each admission task.
pub(crate) struct ServerState<A: Authenticator> {
    pub(crate) hub: HubHandle,
    pub(crate) auth: A,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Huddle server.
///
/// # Example
///
/// ```rust,ignore
/// use huddle::prelude::*;
///
/// let server = ChatServer::builder()
///     .bind("0.0.0.0:8080")
///     .path_prefix("/chat")
///     .build(my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct ChatServerBuilder {
    config: ServerConfig,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the path prefix clients connect under.
    pub fn path_prefix(mut self, prefix: &str) -> Self {
        self.config.path_prefix = prefix.to_string();
        self
    }

    /// Sets the per-connection configuration.
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.config.client = config;
        self
    }

    /// Binds the listener and starts the hub.
    ///
    /// The hub is spawned here, once, and lives as long as the server.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<ChatServer<A>, HuddleError> {
        let config = self.config.validated();
        let transport = WebSocketTransport::bind(&config.bind_addr)
            .await?
            .with_max_message_size(config.client.max_frame_size);

        let state = Arc::new(ServerState {
            hub: Hub::spawn(),
            auth,
            config,
        });

        Ok(ChatServer { transport, state })
    }
}

impl Default for ChatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Huddle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ChatServer<A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
}

impl<A: Authenticator> ChatServer<A> {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle to the server's hub.
    pub fn hub(&self) -> HubHandle {
        self.state.hub.clone()
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection is admitted on its own task. Runs until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), HuddleError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            prefix = %self.state.config.path_prefix,
            "Huddle server running"
        );

        loop {
            match self.transport.accept().await {
                Ok((conn, upgrade)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = admit(conn, upgrade, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection rejected"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
