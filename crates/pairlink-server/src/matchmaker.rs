//! FIFO matchmaker.
//!
//! Pairs peers in arrival order. A join either matches the caller with the
//! longest-waiting live peer or enqueues the caller. The caller that was
//! already waiting becomes the session initiator (it originates the SDP
//! offer), which gives a deterministic tie-break.
//!
//! The driver processes one event at a time, so a whole join (liveness
//! re-check loop included) executes atomically relative to other queue
//! operations.

use std::collections::VecDeque;

use pairlink_core::env::Environment;

use crate::{
    registry::{ConnectionRegistry, PeerStatus},
    session_table::SessionTable,
};

/// Result of a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Enqueued; no live partner was available.
    Waiting,

    /// Duplicate request: caller was already waiting or already paired.
    /// Tolerated as a no-op rather than an error.
    Ignored,

    /// Paired with a waiting peer.
    Matched {
        /// Newly allocated session id.
        session_id: u128,
        /// Both participants.
        participants: [u64; 2],
        /// The peer that was already waiting; it originates the offer.
        initiator_id: u64,
    },
}

/// FIFO queue of peers waiting for a partner.
///
/// # Invariants
///
/// - No duplicates: a peer id appears at most once.
/// - Every queued peer has status `Waiting` in the registry, except for
///   entries whose peer raced a disconnect; those are discarded lazily by the
///   liveness check in [`Matchmaker::join_queue`].
#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: VecDeque<u64>,
}

impl Matchmaker {
    /// Create an empty matchmaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued entries, stale ones included.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Process a join request from `peer_id`.
    ///
    /// Pops queue heads until a live partner is found (one that is still
    /// registered and still `Waiting`), discarding entries that raced a
    /// disconnect. On a live partner, allocates a session and moves both
    /// peers to `InSession`. With no live partner, the caller is enqueued and
    /// moved to `Waiting`.
    ///
    /// Joining while already `Waiting` or `InSession` is a no-op.
    pub fn join_queue<E: Environment>(
        &mut self,
        peer_id: u64,
        registry: &mut ConnectionRegistry,
        sessions: &mut SessionTable<E::Instant>,
        env: &E,
    ) -> MatchOutcome {
        match registry.status(peer_id) {
            Some(PeerStatus::Idle) => {},
            Some(PeerStatus::Waiting | PeerStatus::InSession(_)) | None => {
                return MatchOutcome::Ignored;
            },
        }

        while let Some(partner_id) = self.queue.pop_front() {
            // Liveness check: the entry may have raced a disconnect
            if registry.status(partner_id) != Some(PeerStatus::Waiting) {
                continue;
            }

            let session_id = env.random_u128();
            let participants = [partner_id, peer_id];

            let created = sessions.create(session_id, participants, partner_id, env.now());
            debug_assert!(created, "participants were Idle/Waiting, session must be creatable");

            registry.set_status(partner_id, PeerStatus::InSession(session_id));
            registry.set_status(peer_id, PeerStatus::InSession(session_id));

            return MatchOutcome::Matched { session_id, participants, initiator_id: partner_id };
        }

        self.queue.push_back(peer_id);
        registry.set_status(peer_id, PeerStatus::Waiting);
        MatchOutcome::Waiting
    }

    /// Remove a peer from the queue (disconnect while waiting).
    ///
    /// Returns `true` if the peer was queued.
    pub fn remove(&mut self, peer_id: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|id| *id != peer_id);
        self.queue.len() != before
    }
}
