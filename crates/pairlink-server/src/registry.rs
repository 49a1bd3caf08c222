//! Connection registry for peer matchmaking state.
//!
//! The registry tracks every peer that completed the link handshake and the
//! matchmaking state it is in: idle, waiting for a partner, or paired into a
//! session. It is the single source of truth the matchmaker and relay consult
//! before acting on a frame.
//!
//! Peers must be explicitly registered after their handshake. Unregistering
//! is idempotent; a second unregister of the same peer is a no-op.

use std::collections::HashMap;

/// Matchmaking state of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Connected, not looking for a partner.
    Idle,
    /// Enqueued, waiting to be paired.
    Waiting,
    /// Paired into the session with this id.
    InSession(u128),
}

/// Registry tracking connected peers and their matchmaking state.
///
/// # Invariants
///
/// - A peer is `Waiting` if and only if it sits in the matchmaker's queue.
///   The matchmaker keeps both sides of this in sync.
/// - A peer is `InSession(s)` if and only if the session table has a session
///   `s` listing it as a participant.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Peer ID → matchmaking status
    peers: HashMap<u64, PeerStatus>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new peer in `Idle` state.
    ///
    /// Returns `false` if the peer is already registered.
    pub fn register_peer(&mut self, peer_id: u64) -> bool {
        if self.peers.contains_key(&peer_id) {
            return false;
        }
        self.peers.insert(peer_id, PeerStatus::Idle);
        true
    }

    /// Unregister a peer.
    ///
    /// Returns the status the peer had, or `None` if it was not registered.
    /// Idempotent: a repeated call returns `None` and changes nothing.
    pub fn unregister_peer(&mut self, peer_id: u64) -> Option<PeerStatus> {
        self.peers.remove(&peer_id)
    }

    /// Current status of a peer. `None` if not registered.
    pub fn status(&self, peer_id: u64) -> Option<PeerStatus> {
        self.peers.get(&peer_id).copied()
    }

    /// Update a peer's status.
    ///
    /// Returns `false` if the peer is not registered.
    pub fn set_status(&mut self, peer_id: u64, status: PeerStatus) -> bool {
        match self.peers.get_mut(&peer_id) {
            Some(slot) => {
                *slot = status;
                true
            },
            None => false,
        }
    }

    /// Check if a peer is registered.
    pub fn has_peer(&self, peer_id: u64) -> bool {
        self.peers.contains_key(&peer_id)
    }

    /// Session id the peer is paired into. `None` if not in a session.
    pub fn session_of(&self, peer_id: u64) -> Option<u128> {
        match self.peers.get(&peer_id) {
            Some(PeerStatus::InSession(session_id)) => Some(*session_id),
            _ => None,
        }
    }

    /// Total number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of peers currently waiting for a partner.
    pub fn waiting_count(&self) -> usize {
        self.peers.values().filter(|s| **s == PeerStatus::Waiting).count()
    }
}
