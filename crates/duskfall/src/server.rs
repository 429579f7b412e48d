//! `DuskfallServer` builder and server loop.
//!
//! This is the entry point for running a Duskfall server. It ties together
//! all the layers: transport → protocol → lobby → session.

use std::sync::Arc;

use duskfall_lobby::{Queue, QueueConfig};
use duskfall_protocol::{Codec, JsonCodec};
use duskfall_session::{SessionConfig, SessionManager};
use duskfall_transport::{Transport, WebSocketTransport};
use tokio::sync::mpsc;

use crate::chat::ChatHub;
use crate::handler::handle_connection;
use crate::{DuskfallError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// The queue locks internally and the session manager is a channel handle,
/// so the whole thing is shared through a plain `Arc`.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) queue: Queue,
    pub(crate) sessions: SessionManager,
    pub(crate) chat: ChatHub,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Duskfall server.
///
/// # Example
///
/// ```rust,no_run
/// use duskfall::prelude::*;
///
/// # async fn start() -> Result<(), DuskfallError> {
/// let server = DuskfallServer::builder()
///     .bind("0.0.0.0:9000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuskfallServerBuilder {
    config: ServerConfig,
}

impl DuskfallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the queue configuration.
    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.config.queue = config;
        self
    }

    /// Sets the configuration every session is started with.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Validates the configuration, binds the listener and starts the
    /// session manager.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DuskfallServer<JsonCodec>, DuskfallError> {
        self.config.validate()?;
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let sessions = SessionManager::spawn(self.config.session.clone(), intake_rx);
        let queue = Queue::new(self.config.queue.clone(), intake_tx);

        let state = Arc::new(ServerState {
            queue,
            sessions,
            chat: ChatHub::default(),
            codec: JsonCodec,
        });

        Ok(DuskfallServer { transport, state })
    }
}

impl Default for DuskfallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Duskfall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuskfallServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl DuskfallServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> DuskfallServerBuilder {
        DuskfallServerBuilder::new()
    }
}

impl<C: Codec> DuskfallServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop, spawning one handler task per connection.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), DuskfallError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Duskfall server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
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
