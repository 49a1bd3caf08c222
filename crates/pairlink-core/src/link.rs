//! Link layer state machine.
//!
//! Manages per-connection lifecycle: handshake, heartbeats, timeouts, and
//! graceful shutdown. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute, keeping the state machine pure
//! (no I/O) and directly testable.
//!
//! Matchmaking, relay, and chat frames are NOT handled here. The driver
//! consults [`Link::state`] before dispatching those, so frames arriving
//! before the handshake completes are rejected.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐    Hello / HelloReply    ┌───────┐
//! │ Init │─────────────────────────>│ Ready │
//! └──────┘                          └───────┘
//!     │                                 │
//!     │ Timeout/Error                   │ Goodbye/Timeout
//!     ↓                                 ↓
//! ┌────────┐                       ┌────────┐
//! │ Closed │<──────────────────────│ Closed │
//! └────────┘                       └────────┘
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use pairlink_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{Goodbye, HelloReply},
};

use crate::error::LinkError;

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time allowed without any activity before the link is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the link sends Ping frames while ready.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the link state machine.
///
/// The driver (test harness or production server) executes these:
/// - `SendFrame`: serialize and send the frame over the transport
/// - `Close`: close the connection with the given reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Initial state, waiting for the client's Hello
    Init,
    /// Handshake complete, peer id assigned
    Ready,
    /// Link closed (graceful or error)
    Closed,
}

/// Link configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Timeout for completing handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < idle_timeout / 2)
    pub heartbeat_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Server-side link state machine for a single connection.
///
/// This is a pure state machine: no I/O, no Environment storage. Time is
/// passed as a parameter to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Link<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state
    state: LinkState,
    /// Configuration
    config: LinkConfig,
    /// Last activity timestamp
    last_activity: I,
    /// Last heartbeat sent timestamp
    last_heartbeat: Option<I>,
    /// Peer id assigned during the handshake
    peer_id: Option<u64>,
}

impl<I> Link<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new link in [`LinkState::Init`] state
    pub fn new(now: I, config: LinkConfig) -> Self {
        Self {
            state: LinkState::Init,
            config,
            last_activity: now,
            last_heartbeat: None,
            peer_id: None,
        }
    }

    /// Current link state
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    /// Peer id assigned to this link. `None` until the server sets it.
    #[must_use]
    pub fn peer_id(&self) -> Option<u64> {
        self.peer_id
    }

    /// Assign the peer id (server use only, before handling Hello).
    ///
    /// The server generates a random peer id when it accepts the connection
    /// and sets it here. The state machine uses this id when constructing the
    /// HelloReply.
    pub fn set_peer_id(&mut self, peer_id: u64) {
        self.peer_id = Some(peer_id);
    }

    /// Mark link as closed.
    pub fn close(&mut self) {
        self.state = LinkState::Closed;
    }

    /// Mark link as active (call when receiving frames).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if timeout exceeded. `None`
    /// otherwise.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.state {
            LinkState::Init => self.config.handshake_timeout,
            LinkState::Ready => self.config.idle_timeout,
            LinkState::Closed => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<LinkAction> {
        let mut actions = Vec::new();

        if let Some(elapsed) = self.check_timeout(now) {
            let reason = match self.state {
                LinkState::Init => format!("handshake timeout after {elapsed:?}"),
                LinkState::Ready => format!("idle timeout after {elapsed:?}"),
                LinkState::Closed => "timeout".to_string(),
            };

            self.close();
            actions.push(LinkAction::Close { reason });
            return actions;
        }

        if self.state == LinkState::Ready {
            let should_send = match self.last_heartbeat {
                None => true,
                Some(last) => {
                    let elapsed = now - last;
                    elapsed >= self.config.heartbeat_interval
                },
            };

            if should_send {
                let ping_frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());
                actions.push(LinkAction::SendFrame(ping_frame));
                self.last_heartbeat = Some(now);
                self.last_activity = now;
            }
        }

        actions
    }

    /// Process an incoming link-management frame and update state.
    ///
    /// Handles Hello, Ping, Pong, Goodbye, and Error opcodes. The Hello
    /// handler replies with HelloReply carrying the previously assigned peer
    /// id.
    ///
    /// # Errors
    ///
    /// - [`LinkError::UnexpectedFrame`] if opcode invalid for current state
    /// - [`LinkError::InvalidPayload`] if CBOR deserialization fails
    /// - [`LinkError::UnsupportedVersion`] if Hello version is not 1
    /// - [`LinkError::Protocol`] if the server peer id is not set
    pub fn handle_frame(&mut self, frame: &Frame, now: I) -> Result<Vec<LinkAction>, LinkError> {
        self.last_activity = now;

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(LinkError::UnexpectedFrame {
                state: self.state,
                opcode: frame.header.opcode(),
            });
        };

        match (self.state, opcode) {
            (LinkState::Init, Opcode::Hello) => {
                let payload = Payload::from_frame(frame)?;

                let Payload::Hello(hello) = payload else {
                    return Err(LinkError::InvalidPayload {
                        expected: "Hello",
                        opcode: Opcode::Hello.to_u16(),
                    });
                };

                if hello.version != 1 {
                    return Err(LinkError::UnsupportedVersion(hello.version));
                }

                let Some(peer_id) = self.peer_id else {
                    return Err(LinkError::Protocol(
                        "server must set peer_id before handling Hello".to_string(),
                    ));
                };

                debug_assert_ne!(peer_id, 0);
                self.state = LinkState::Ready;

                let reply = Payload::HelloReply(HelloReply { peer_id });
                let frame = reply.into_frame(FrameHeader::new(Opcode::HelloReply))?;

                Ok(vec![LinkAction::SendFrame(frame)])
            },

            (LinkState::Ready, Opcode::Ping) => {
                let pong_frame = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());
                Ok(vec![LinkAction::SendFrame(pong_frame)])
            },

            (LinkState::Ready, Opcode::Pong) => {
                // Activity already updated
                Ok(vec![])
            },

            (state, Opcode::Goodbye) if state != LinkState::Closed => {
                let payload = Payload::from_frame(frame)?;

                let Payload::Goodbye(goodbye) = payload else {
                    return Err(LinkError::InvalidPayload {
                        expected: "Goodbye",
                        opcode: Opcode::Goodbye.to_u16(),
                    });
                };

                self.state = LinkState::Closed;

                let reply = Payload::Goodbye(Goodbye { reason: "ack".to_string() });
                let frame = reply.into_frame(FrameHeader::new(Opcode::Goodbye))?;

                Ok(vec![LinkAction::SendFrame(frame), LinkAction::Close {
                    reason: format!("peer goodbye: {}", goodbye.reason),
                }])
            },

            (_, Opcode::Error) => {
                self.state = LinkState::Closed;
                Ok(vec![LinkAction::Close { reason: "peer error".to_string() }])
            },

            (state, opcode) => {
                Err(LinkError::UnexpectedFrame { state, opcode: opcode.to_u16() })
            },
        }
    }
}
