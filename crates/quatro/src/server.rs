//! `QuatroServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → lobby. The lobby
//! actor is started by [`QuatroServerBuilder::build`]; every accepted
//! connection then gets its own handler task talking to it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use quatro_match::{LobbyConfig, LobbyHandle, MatchStore, spawn_lobby};
use quatro_presence::IdentityResolver;
use quatro_protocol::{Codec, JsonCodec};
use quatro_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{QuatroError, ServerConfig};

/// Shared state handed to each connection handler task.
pub(crate) struct ServerState<R: IdentityResolver, C: Codec> {
    pub(crate) lobby: LobbyHandle,
    pub(crate) resolver: R,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Quatro server.
///
/// The resolver and store types are fixed by [`build`](Self::build), so
/// the builder itself is not generic.
pub struct QuatroServerBuilder {
    config: ServerConfig,
}

impl QuatroServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration, typically with [`ServerConfig::load`].
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn lobby_config(mut self, lobby: LobbyConfig) -> Self {
        self.config.lobby = lobby;
        self
    }

    /// Binds the listener and starts the lobby with `store` behind it.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<R, S>(
        self,
        resolver: R,
        store: S,
    ) -> Result<QuatroServer<R, JsonCodec>, QuatroError>
    where
        R: IdentityResolver,
        S: MatchStore,
    {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        let lobby = spawn_lobby(self.config.lobby.clone(), store);

        let state = Arc::new(ServerState {
            lobby,
            resolver,
            codec: JsonCodec,
            config: self.config,
        });
        Ok(QuatroServer { transport, state })
    }
}

impl Default for QuatroServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Quatro server. Call [`run`](Self::run) to start accepting.
pub struct QuatroServer<R: IdentityResolver, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<R, C>>,
}

impl<R, C> QuatroServer<R, C>
where
    R: IdentityResolver,
    C: Codec,
{
    pub fn local_addr(&self) -> Result<SocketAddr, QuatroError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle to the running lobby, for in-process inspection.
    pub fn lobby(&self) -> LobbyHandle {
        self.state.lobby.clone()
    }

    /// Accepts connections until the process is terminated.
    pub async fn run(self) -> Result<(), QuatroError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then stops the
    /// lobby. Connections already open are left to wind down on their own.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), QuatroError> {
        tracing::info!(bind = %self.state.config.bind, "Quatro server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::Shutdown) => break,
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    self.transport.shutdown().await?;
                    break;
                }
            }
        }

        // The lobby may already be gone; nothing left to stop then.
        let _ = self.state.lobby.shutdown().await;
        Ok(())
    }
}
