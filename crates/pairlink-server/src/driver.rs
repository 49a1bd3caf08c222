//! Server driver.
//!
//! Ties together the per-connection link machines, the matchmaker, the
//! session table, and the relay routing checks. Pure logic: events in,
//! actions out. The runtime feeds it one event at a time, which makes every
//! join/skip/disconnect atomic relative to the shared matchmaking state.

use std::{collections::HashMap, time::Instant};

use pairlink_core::{
    env::Environment,
    link::{Link, LinkAction, LinkConfig},
};
use pairlink_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{EndReason, ErrorPayload, Matched, SessionEnded},
};

use crate::{
    lifecycle::{self, EndCause},
    matchmaker::{MatchOutcome, Matchmaker},
    registry::{ConnectionRegistry, PeerStatus},
    relay::{self, RelayReject},
    server_error::ServerError,
    session_table::SessionTable,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Link configuration (timeouts, heartbeat interval)
    pub link: LinkConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { link: LinkConfig::default(), max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (test harness or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique peer ID assigned by the runtime
        peer_id: u64,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Peer that sent the frame
        peer_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Peer whose connection closed
        peer_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to a specific peer
    SendToPeer {
        /// Target peer ID
        peer_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Close a connection
    ClosePeer {
        /// Peer to close
        peer_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: Instant,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Orchestrates link management, matchmaking, and relay routing.
pub struct ServerDriver<E>
where
    E: Environment<Instant = Instant>,
{
    /// Link state machines (peer_id → Link)
    links: HashMap<u64, Link>,
    /// Peer matchmaking state
    registry: ConnectionRegistry,
    /// FIFO waiting queue
    matchmaker: Matchmaker,
    /// Active pairings
    sessions: SessionTable<Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment<Instant = Instant>,
{
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self {
            links: HashMap::new(),
            registry: ConnectionRegistry::new(),
            matchmaker: Matchmaker::new(),
            sessions: SessionTable::new(),
            env,
            config,
        }
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.links.len()
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { peer_id } => self.handle_connection_accepted(peer_id),
            ServerEvent::FrameReceived { peer_id, frame } => {
                self.handle_frame_received(peer_id, frame)
            },
            ServerEvent::ConnectionClosed { peer_id, reason } => {
                self.handle_connection_closed(peer_id, &reason)
            },
            ServerEvent::Tick => self.handle_tick(),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        peer_id: u64,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();

        if self.links.len() >= self.config.max_connections {
            return Ok(vec![ServerAction::ClosePeer {
                peer_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        let mut link = Link::new(now, self.config.link.clone());
        link.set_peer_id(peer_id);

        self.links.insert(peer_id, link);
        self.registry.register_peer(peer_id);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, peer_id={peer_id}"),
            timestamp: now,
        }])
    }

    /// Handle a frame received from a connection.
    fn handle_frame_received(
        &mut self,
        peer_id: u64,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();

        let link = self.links.get_mut(&peer_id).ok_or(ServerError::PeerNotFound(peer_id))?;

        let Some(opcode) = frame.header.opcode_enum() else {
            return Ok(self.error_response(
                peer_id,
                ErrorPayload::invalid_payload(format!(
                    "unknown opcode {:#06x}",
                    frame.header.opcode()
                )),
            ));
        };

        match opcode {
            Opcode::Hello | Opcode::Ping | Opcode::Pong | Opcode::Goodbye | Opcode::Error => {
                // Link-layer frames
                let link_actions = link
                    .handle_frame(&frame, now)
                    .map_err(|e| ServerError::ConnectionFailed { peer_id, reason: e.to_string() })?;

                Ok(link_actions
                    .into_iter()
                    .map(|action| match action {
                        LinkAction::SendFrame(f) => ServerAction::SendToPeer { peer_id, frame: f },
                        LinkAction::Close { reason } => ServerAction::ClosePeer { peer_id, reason },
                    })
                    .collect())
            },

            Opcode::JoinQueue | Opcode::Skip if !link.is_ready() => {
                Ok(self.error_response(peer_id, ErrorPayload::not_ready()))
            },

            _ if opcode.is_relay() && !link.is_ready() => {
                Ok(self.error_response(peer_id, ErrorPayload::not_ready()))
            },

            Opcode::JoinQueue => {
                link.update_activity(now);
                Ok(self.handle_join_queue(peer_id))
            },

            Opcode::Skip => {
                link.update_activity(now);
                Ok(self.handle_skip(peer_id, frame.header.session_id()))
            },

            Opcode::Offer | Opcode::Answer | Opcode::Candidate => {
                link.update_activity(now);
                Ok(self.handle_signal(peer_id, frame))
            },

            Opcode::Chat => {
                link.update_activity(now);
                Ok(self.handle_chat(peer_id, frame))
            },

            // Server-to-client opcodes are never valid inbound
            Opcode::HelloReply | Opcode::QueueWaiting | Opcode::Matched | Opcode::SessionEnded => {
                Ok(self.error_response(
                    peer_id,
                    ErrorPayload::invalid_payload(format!(
                        "opcode {:#06x} is server-to-client only",
                        opcode.to_u16()
                    )),
                ))
            },
        }
    }

    /// Handle a join request: match with a waiting peer or enqueue.
    fn handle_join_queue(&mut self, peer_id: u64) -> Vec<ServerAction> {
        let now = self.env.now();

        let outcome =
            self.matchmaker.join_queue(peer_id, &mut self.registry, &mut self.sessions, &self.env);

        match outcome {
            MatchOutcome::Waiting => {
                match Payload::QueueWaiting.into_frame(FrameHeader::new(Opcode::QueueWaiting)) {
                    Ok(frame) => vec![ServerAction::SendToPeer { peer_id, frame }, ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!("peer {peer_id} waiting for a partner"),
                        timestamp: now,
                    }],
                    Err(e) => self.encode_failure(e),
                }
            },

            MatchOutcome::Ignored => vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("duplicate join from peer {peer_id} ignored"),
                timestamp: now,
            }],

            MatchOutcome::Matched { session_id, participants, initiator_id } => {
                let payload =
                    Payload::Matched(Matched { session_id, participants, initiator_id });
                let mut header = FrameHeader::new(Opcode::Matched);
                header.set_session_id(session_id);

                match payload.into_frame(header) {
                    Ok(frame) => {
                        let mut actions: Vec<ServerAction> = participants
                            .iter()
                            .map(|participant| ServerAction::SendToPeer {
                                peer_id: *participant,
                                frame: frame.clone(),
                            })
                            .collect();

                        actions.push(ServerAction::Log {
                            level: LogLevel::Info,
                            message: format!(
                                "matched peers {} and {} into session {session_id:032x}, \
                                 initiator {initiator_id}",
                                participants[0], participants[1]
                            ),
                            timestamp: now,
                        });
                        actions
                    },
                    Err(e) => self.encode_failure(e),
                }
            },
        }
    }

    /// Handle a skip request.
    ///
    /// A waiting peer leaves the queue and returns to idle, silently. A
    /// paired peer tears down its session and the partner is notified.
    ///
    /// A skip whose header names a session other than the sender's current
    /// one raced a teardown that already happened; it is a no-op so a stale
    /// skip cannot destroy a newly formed pairing.
    fn handle_skip(&mut self, peer_id: u64, requested_session: u128) -> Vec<ServerAction> {
        let now = self.env.now();

        if self.registry.status(peer_id) == Some(PeerStatus::Waiting) {
            self.matchmaker.remove(peer_id);
            self.registry.set_status(peer_id, PeerStatus::Idle);
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("peer {peer_id} left the queue"),
                timestamp: now,
            }];
        }

        let Some(current) = self.sessions.session_for_peer(peer_id).map(|s| s.id) else {
            return self.error_response(peer_id, ErrorPayload::not_in_session());
        };

        if requested_session != 0 && requested_session != current {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "stale skip from peer {peer_id} for session {requested_session:032x} ignored"
                ),
                timestamp: now,
            }];
        }

        let Some(end) =
            lifecycle::end_session_of(peer_id, EndCause::Skip, &mut self.registry, &mut self.sessions)
        else {
            return self.error_response(peer_id, ErrorPayload::not_in_session());
        };

        let payload = Payload::SessionEnded(SessionEnded {
            session_id: end.session_id,
            reason: EndReason::from(end.cause),
        });
        let mut header = FrameHeader::new(Opcode::SessionEnded);
        header.set_session_id(end.session_id);

        match payload.into_frame(header) {
            Ok(frame) => vec![
                ServerAction::SendToPeer { peer_id: end.partner_id, frame },
                ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!(
                        "peer {peer_id} skipped session {:032x}, partner {}",
                        end.session_id, end.partner_id
                    ),
                    timestamp: now,
                },
            ],
            Err(e) => self.encode_failure(e),
        }
    }

    /// Handle a signaling frame (offer, answer, candidate).
    ///
    /// The payload is forwarded verbatim; only the header routing fields are
    /// stamped before delivery.
    fn handle_signal(&mut self, peer_id: u64, mut frame: Frame) -> Vec<ServerAction> {
        match relay::route_signal(peer_id, frame.header.target_id(), &self.sessions) {
            Ok(route) => {
                frame.header.set_sender_id(peer_id);
                frame.header.set_session_id(route.session_id);

                vec![ServerAction::SendToPeer { peer_id: route.target_id, frame }]
            },
            Err(reject) => self.relay_reject_response(peer_id, reject),
        }
    }

    /// Handle a chat frame. No explicit target; always the session partner.
    fn handle_chat(&mut self, peer_id: u64, mut frame: Frame) -> Vec<ServerAction> {
        match relay::route_chat(peer_id, &self.sessions) {
            Ok(route) => {
                frame.header.set_sender_id(peer_id);
                frame.header.set_target_id(route.target_id);
                frame.header.set_session_id(route.session_id);

                vec![ServerAction::SendToPeer { peer_id: route.target_id, frame }]
            },
            Err(reject) => self.relay_reject_response(peer_id, reject),
        }
    }

    /// Handle a connection being closed.
    fn handle_connection_closed(
        &mut self,
        peer_id: u64,
        reason: &str,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        if let Some(mut link) = self.links.remove(&peer_id) {
            link.close();
        }

        let outcome = lifecycle::handle_disconnect(
            peer_id,
            &mut self.registry,
            &mut self.matchmaker,
            &mut self.sessions,
        );

        if !outcome.was_registered {
            return Ok(actions);
        }

        if let Some(end) = outcome.ended {
            let payload = Payload::SessionEnded(SessionEnded {
                session_id: end.session_id,
                reason: EndReason::from(end.cause),
            });
            let mut header = FrameHeader::new(Opcode::SessionEnded);
            header.set_session_id(end.session_id);

            match payload.into_frame(header) {
                Ok(frame) => {
                    actions.push(ServerAction::SendToPeer { peer_id: end.partner_id, frame });
                },
                Err(e) => actions.extend(self.encode_failure(e)),
            }
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "peer {peer_id} disconnected: {reason} (was_waiting={}, ended_session={})",
                outcome.was_waiting,
                outcome.ended.is_some()
            ),
            timestamp: now,
        });

        Ok(actions)
    }

    /// Handle periodic tick for timeout checking.
    fn handle_tick(&mut self) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let peer_ids: Vec<u64> = self.links.keys().copied().collect();

        for peer_id in peer_ids {
            if let Some(link) = self.links.get_mut(&peer_id) {
                for action in link.tick(now) {
                    match action {
                        LinkAction::SendFrame(f) => {
                            actions.push(ServerAction::SendToPeer { peer_id, frame: f });
                        },
                        LinkAction::Close { reason } => {
                            actions.push(ServerAction::ClosePeer { peer_id, reason });
                        },
                    }
                }
            }
        }

        Ok(actions)
    }

    /// Build an error frame for a peer plus a warn log.
    fn error_response(&self, peer_id: u64, payload: ErrorPayload) -> Vec<ServerAction> {
        let message = payload.message.clone();
        match Payload::Error(payload).into_frame(FrameHeader::new(Opcode::Error)) {
            Ok(frame) => vec![ServerAction::SendToPeer { peer_id, frame }, ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("rejected frame from peer {peer_id}: {message}"),
                timestamp: self.env.now(),
            }],
            Err(e) => self.encode_failure(e),
        }
    }

    /// Map a relay rejection to its error response.
    fn relay_reject_response(&self, peer_id: u64, reject: RelayReject) -> Vec<ServerAction> {
        let payload = match reject {
            RelayReject::NotInSession => ErrorPayload::not_in_session(),
            RelayReject::UnknownTarget { target_id } => ErrorPayload::unknown_target(target_id),
        };
        self.error_response(peer_id, payload)
    }

    /// Log-only fallback when an outbound frame fails to encode.
    fn encode_failure(&self, err: pairlink_proto::ProtocolError) -> Vec<ServerAction> {
        vec![ServerAction::Log {
            level: LogLevel::Error,
            message: format!("failed to encode response frame: {err}"),
            timestamp: self.env.now(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pairlink_proto::payloads::Hello;

    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (i as u8).wrapping_mul(31).wrapping_add(17);
            }
        }
    }

    fn driver() -> ServerDriver<TestEnv> {
        ServerDriver::new(TestEnv, ServerConfig::default())
    }

    fn connect(driver: &mut ServerDriver<TestEnv>, peer_id: u64) {
        driver.process_event(ServerEvent::ConnectionAccepted { peer_id }).unwrap();

        let hello = Payload::Hello(Hello { version: 1 })
            .into_frame(FrameHeader::new(Opcode::Hello))
            .unwrap();
        driver.process_event(ServerEvent::FrameReceived { peer_id, frame: hello }).unwrap();
    }

    fn frames_to(actions: &[ServerAction], peer_id: u64) -> Vec<Frame> {
        actions
            .iter()
            .filter_map(|a| match a {
                ServerAction::SendToPeer { peer_id: p, frame } if *p == peer_id => {
                    Some(frame.clone())
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn join_before_handshake_rejected() {
        let mut d = driver();
        d.process_event(ServerEvent::ConnectionAccepted { peer_id: 1 }).unwrap();

        let join = Frame::new(FrameHeader::new(Opcode::JoinQueue), Vec::new());
        let actions =
            d.process_event(ServerEvent::FrameReceived { peer_id: 1, frame: join }).unwrap();

        let frames = frames_to(&actions, 1);
        assert_eq!(frames.len(), 1);
        match Payload::from_frame(&frames[0]).unwrap() {
            Payload::Error(err) => assert_eq!(err.code, ErrorPayload::NOT_READY),
            other => panic!("expected Error payload, got {other:?}"),
        }
    }

    #[test]
    fn max_connections_enforced() {
        let mut d = ServerDriver::new(TestEnv, ServerConfig {
            link: LinkConfig::default(),
            max_connections: 1,
        });

        connect(&mut d, 1);
        let actions = d.process_event(ServerEvent::ConnectionAccepted { peer_id: 2 }).unwrap();
        assert!(matches!(actions[0], ServerAction::ClosePeer { peer_id: 2, .. }));
    }

    #[test]
    fn two_joins_form_a_session() {
        let mut d = driver();
        connect(&mut d, 1);
        connect(&mut d, 2);

        let join = Frame::new(FrameHeader::new(Opcode::JoinQueue), Vec::new());
        let actions = d
            .process_event(ServerEvent::FrameReceived { peer_id: 1, frame: join.clone() })
            .unwrap();
        let waiting = frames_to(&actions, 1);
        assert_eq!(waiting[0].header.opcode_enum(), Some(Opcode::QueueWaiting));

        let actions =
            d.process_event(ServerEvent::FrameReceived { peer_id: 2, frame: join }).unwrap();

        // Both participants get the same Matched payload
        for peer_id in [1, 2] {
            let frames = frames_to(&actions, peer_id);
            assert_eq!(frames.len(), 1);
            match Payload::from_frame(&frames[0]).unwrap() {
                Payload::Matched(m) => {
                    assert_eq!(m.participants, [1, 2]);
                    assert_eq!(m.initiator_id, 1);
                    assert_eq!(frames[0].header.session_id(), m.session_id);
                },
                other => panic!("expected Matched payload, got {other:?}"),
            }
        }

        assert_eq!(d.session_count(), 1);
    }

    #[test]
    fn relay_stamps_sender_and_session() {
        let mut d = driver();
        connect(&mut d, 1);
        connect(&mut d, 2);

        let join = Frame::new(FrameHeader::new(Opcode::JoinQueue), Vec::new());
        d.process_event(ServerEvent::FrameReceived { peer_id: 1, frame: join.clone() }).unwrap();
        d.process_event(ServerEvent::FrameReceived { peer_id: 2, frame: join }).unwrap();

        let mut header = FrameHeader::new(Opcode::Candidate);
        header.set_target_id(2);
        let candidate = Frame::new(header, b"candidate-blob".to_vec());

        let actions =
            d.process_event(ServerEvent::FrameReceived { peer_id: 1, frame: candidate }).unwrap();
        let delivered = frames_to(&actions, 2);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].header.sender_id(), 1);
        assert_ne!(delivered[0].header.session_id(), 0);
        assert_eq!(&delivered[0].payload[..], b"candidate-blob");
    }

    #[test]
    fn tick_times_out_stalled_handshake() {
        let mut d = ServerDriver::new(TestEnv, ServerConfig {
            link: LinkConfig { handshake_timeout: Duration::ZERO, ..LinkConfig::default() },
            max_connections: 10,
        });
        d.process_event(ServerEvent::ConnectionAccepted { peer_id: 1 }).unwrap();

        std::thread::sleep(Duration::from_millis(5));

        let actions = d.process_event(ServerEvent::Tick).unwrap();
        assert!(actions.iter().any(|a| matches!(a, ServerAction::ClosePeer { peer_id: 1, .. })));
    }

    #[test]
    fn frame_from_unknown_peer_errors() {
        let mut d = driver();

        let join = Frame::new(FrameHeader::new(Opcode::JoinQueue), Vec::new());
        let result = d.process_event(ServerEvent::FrameReceived { peer_id: 9, frame: join });
        assert!(matches!(result, Err(ServerError::PeerNotFound(9))));
    }
}
