//! Pairlink matchmaking and signaling server.
//!
//! Production server using Quinn for QUIC transport, Tokio for the async
//! runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! The [`ServerDriver`] is pure logic following the Sans-IO pattern: events
//! in, actions out, no I/O of its own. [`Server`] is the production glue that
//! feeds it events from Quinn streams and executes the resulting actions.
//!
//! The driver sits behind a single mutex and processes one event at a time,
//! so every join, skip, and disconnect observes and mutates the matchmaking
//! state atomically.
//!
//! # Ordering
//!
//! Each client sends all its frames on one long-lived bidirectional stream,
//! which the server reads sequentially. All frames to a client go out on one
//! unidirectional stream. Together these preserve per-sender frame order end
//! to end, which SDP negotiation and trickled ICE candidates rely on.
//!
//! # Components
//!
//! - [`ServerDriver`]: event/action orchestrator (pure logic, no I/O)
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod lifecycle;
mod matchmaker;
mod registry;
mod relay;
mod server_error;
mod session_table;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::BytesMut;
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use lifecycle::{DisconnectOutcome, EndCause, SessionEnd};
pub use matchmaker::{MatchOutcome, Matchmaker};
use pairlink_core::env::Environment;
use pairlink_proto::{Frame, FrameHeader};
pub use registry::{ConnectionRegistry, PeerStatus};
pub use relay::{RelayReject, RelayRoute};
pub use server_error::ServerError;
pub use session_table::{Session, SessionTable};
pub use system_env::SystemEnv;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};

/// How often the tick loop fires timeout and heartbeat checks.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state for all connections.
struct SharedState {
    /// Map of peer ID to QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Map of peer ID to persistent outbound stream.
    /// All frames to a client go through this single stream, ensuring
    /// ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Production pairlink server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and system environment.
pub struct Server {
    /// The event/action server driver
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// This method runs until the server is shut down or an error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let env = env.clone();

            tokio::spawn(async move {
                loop {
                    env.sleep(TICK_INTERVAL).await;

                    let actions = {
                        let mut driver = driver.lock().await;
                        match driver.process_event(ServerEvent::Tick) {
                            Ok(actions) => actions,
                            Err(e) => {
                                tracing::warn!("Tick processing error: {}", e);
                                continue;
                            },
                        }
                    };

                    if let Err(e) = execute_actions(actions, &shared).await {
                        tracing::warn!("Tick action error: {}", e);
                    }
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection.
///
/// Assigns the peer id, opens the outbound stream, then reads the client's
/// single bidirectional stream sequentially until it closes. Frames are
/// processed inline (never spawned per-frame) so a peer's frames reach the
/// driver in the order they were sent.
async fn handle_connection(
    conn: QuinnConnection,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let peer_id = env.random_u64();

    tracing::debug!("New connection: {} from {}", peer_id, conn.remote_addr());

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to open outbound stream: {e}")))?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(peer_id, conn.clone());
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(peer_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { peer_id })?;
        execute_actions(actions, &shared).await?;
    }

    match conn.accept_bi().await {
        Ok((send, recv)) => {
            if let Err(e) = read_frames(peer_id, send, recv, &driver, &shared).await {
                tracing::debug!("Stream error for {}: {}", peer_id, e);
            }
        },
        Err(e) => {
            tracing::debug!("Connection closed before opening a stream: {}", e);
        },
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&peer_id);
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&peer_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            peer_id,
            reason: "connection closed".to_string(),
        })?;
        execute_actions(actions, &shared).await?;
    }

    Ok(())
}

/// Read frames from the client's stream until it closes.
async fn read_frames(
    peer_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: &Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    drop(send); // replies go out on the outbound uni stream

    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + 4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("Invalid frame header from {}: {}", peer_id, e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Frame decode error from {}: {}", peer_id, e);
                break;
            },
        };

        let actions = {
            let mut driver = driver.lock().await;
            match driver.process_event(ServerEvent::FrameReceived { peer_id, frame }) {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::warn!("Frame processing error: {}", e);
                    continue;
                },
            }
        };

        execute_actions(actions, shared).await?;
    }

    Ok(())
}

/// Execute server actions.
async fn execute_actions(
    actions: Vec<ServerAction>,
    shared: &SharedState,
) -> Result<(), ServerError> {
    for action in actions {
        match action {
            ServerAction::SendToPeer { peer_id, frame } => {
                let mut buf = Vec::new();
                frame.encode(&mut buf)?;

                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&peer_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!("SendToPeer write failed for {}: {}", peer_id, e);
                    }
                } else {
                    tracing::warn!("SendToPeer: peer {} not found", peer_id);
                }
            },

            ServerAction::ClosePeer { peer_id, reason } => {
                tracing::info!("Closing connection {}: {}", peer_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&peer_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }

    Ok(())
}
