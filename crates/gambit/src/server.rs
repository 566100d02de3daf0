//! `GambitServer` builder and accept loop.
//!
//! This is the entry point for running a Gambit game service. It ties
//! together all the layers: transport → protocol → session → rules/store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gambit_protocol::{Codec, JsonCodec};
use gambit_rules::RulesOracle;
use gambit_session::{SessionConfig, SessionRegistry};
use gambit_store::GameStore;
use gambit_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::handler::handle_connection;
use crate::{Authenticator, GambitError};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry sits behind one async `Mutex`: `get_or_create` holds it
/// across hydration, which collapses concurrent first-joins for the same
/// game onto a single session actor.
pub(crate) struct ServerState<R, S, A, C>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    pub(crate) registry: Mutex<SessionRegistry<R, S>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    /// Server start time; envelope timestamps count from here.
    pub(crate) started: Instant,
    /// Recv idle timeout for established connections.
    pub(crate) recv_timeout: Duration,
}

/// Builder for configuring and starting a Gambit server.
///
/// # Example
///
/// ```rust,ignore
/// use gambit::prelude::*;
///
/// let server = GambitServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(my_oracle, my_store, my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct GambitServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    sweep_interval: Duration,
    recv_timeout: Duration,
}

impl GambitServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            sweep_interval: Duration::from_secs(30),
            recv_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session engine configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// How often the registry sweeps for evictable sessions.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// How long an established connection may sit silent before it is
    /// dropped. Clients are expected to heartbeat well inside this.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Builds and binds the server with the given rules oracle, durable
    /// store, and authenticator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<R, S>(
        self,
        oracle: R,
        store: S,
        auth: impl Authenticator,
    ) -> Result<GambitServer<R, S, impl Authenticator, JsonCodec>, GambitError>
    where
        R: RulesOracle,
        S: GameStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(SessionRegistry::new(
                Arc::new(oracle),
                store,
                self.session_config,
            )),
            auth,
            codec: JsonCodec,
            started: Instant::now(),
            recv_timeout: self.recv_timeout,
        });

        Ok(GambitServer {
            transport,
            state,
            sweep_interval: self.sweep_interval,
        })
    }
}

impl Default for GambitServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Gambit game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GambitServer<R, S, A, C>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    transport: WebSocketTransport,
    state: Arc<ServerState<R, S, A, C>>,
    sweep_interval: Duration,
}

impl<R, S, A, C> GambitServer<R, S, A, C>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop and the periodic registry sweep.
    ///
    /// Accepts incoming connections, performs the handshake, and spawns
    /// a handler task for each client. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), GambitError> {
        info!("Gambit server running");

        let sweep_state = Arc::clone(&self.state);
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted =
                    sweep_state.registry.lock().await.sweep().await;
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "sweep evicted sessions");
                }
            }
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(conn, state).await
                        {
                            debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}
