//! Session table tracking active pairings.
//!
//! A session is exactly two peers paired by the matchmaker. The table keeps a
//! reverse index from peer id to session id so relay routing and disconnect
//! unwinding are O(1) in both directions.

use std::collections::HashMap;

/// An active pairing between two peers.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Session<I> {
    /// Session identifier, carried in relay frame headers.
    pub id: u128,
    /// Both participant peer ids.
    pub participants: [u64; 2],
    /// The participant that creates the SDP offer.
    pub initiator_id: u64,
    /// When the pairing formed.
    pub created_at: I,
}

impl<I> Session<I> {
    /// The other participant of the session. `None` if `peer_id` is not a
    /// participant.
    pub fn partner_of(&self, peer_id: u64) -> Option<u64> {
        let [a, b] = self.participants;
        if peer_id == a {
            Some(b)
        } else if peer_id == b {
            Some(a)
        } else {
            None
        }
    }

    /// Whether `peer_id` participates in this session.
    pub fn has_participant(&self, peer_id: u64) -> bool {
        self.participants.contains(&peer_id)
    }
}

/// Table of active sessions with a peer reverse index.
///
/// # Invariants
///
/// - Each peer appears in at most one session.
/// - `by_peer` lists exactly the participants of the sessions in `sessions`.
#[derive(Debug, Default)]
pub struct SessionTable<I> {
    /// Session ID → session
    sessions: HashMap<u128, Session<I>>,
    /// Peer ID → session ID (reverse index)
    by_peer: HashMap<u64, u128>,
}

impl<I: Copy> SessionTable<I> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self { sessions: HashMap::new(), by_peer: HashMap::new() }
    }

    /// Create a session pairing two peers.
    ///
    /// Returns `false` without modifying the table if the session id already
    /// exists, either peer is already in a session, the participants are the
    /// same peer, or the initiator is not a participant.
    pub fn create(
        &mut self,
        id: u128,
        participants: [u64; 2],
        initiator_id: u64,
        now: I,
    ) -> bool {
        let [a, b] = participants;

        if a == b
            || !participants.contains(&initiator_id)
            || self.sessions.contains_key(&id)
            || self.by_peer.contains_key(&a)
            || self.by_peer.contains_key(&b)
        {
            return false;
        }

        self.sessions.insert(id, Session { id, participants, initiator_id, created_at: now });
        self.by_peer.insert(a, id);
        self.by_peer.insert(b, id);
        true
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: u128) -> Option<&Session<I>> {
        self.sessions.get(&session_id)
    }

    /// Session a peer participates in. `None` if not paired.
    pub fn session_for_peer(&self, peer_id: u64) -> Option<&Session<I>> {
        let session_id = self.by_peer.get(&peer_id)?;
        self.sessions.get(session_id)
    }

    /// The partner of a peer in its active session. `None` if not paired.
    pub fn partner_of(&self, peer_id: u64) -> Option<u64> {
        self.session_for_peer(peer_id)?.partner_of(peer_id)
    }

    /// Remove a session, unlinking both participants.
    ///
    /// Returns the removed session, or `None` if it did not exist.
    pub fn end(&mut self, session_id: u128) -> Option<Session<I>> {
        let session = self.sessions.remove(&session_id)?;
        for peer_id in session.participants {
            self.by_peer.remove(&peer_id);
        }
        Some(session)
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
