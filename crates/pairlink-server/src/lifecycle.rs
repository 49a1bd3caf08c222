//! Lifecycle coordination for skip and disconnect.
//!
//! Unwinds queue and session state consistently when a peer leaves, and
//! reports who must be notified. The surviving participant returns to idle;
//! it is never re-enqueued automatically and must issue a fresh join.

use pairlink_proto::payloads::EndReason;

use crate::{
    matchmaker::Matchmaker,
    registry::{ConnectionRegistry, PeerStatus},
    session_table::SessionTable,
};

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    /// A participant skipped to find a new match.
    Skip,
    /// A participant's connection closed.
    Disconnect,
}

impl From<EndCause> for EndReason {
    fn from(cause: EndCause) -> Self {
        match cause {
            EndCause::Skip => EndReason::Skip,
            EndCause::Disconnect => EndReason::Disconnect,
        }
    }
}

/// Teardown record for a session that just ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// The session that was removed.
    pub session_id: u128,
    /// The surviving participant to notify.
    pub partner_id: u64,
    /// Why it ended.
    pub cause: EndCause,
}

/// Outcome of a disconnect unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Whether the peer was registered at all.
    pub was_registered: bool,
    /// Whether the peer was removed from the waiting queue.
    pub was_waiting: bool,
    /// Session teardown, if the peer was paired.
    pub ended: Option<SessionEnd>,
}

/// Tear down the session a peer participates in.
///
/// Removes the session from the table and returns both participants'
/// registry state to `Idle`. Returns the teardown record, or `None` if the
/// peer has no active session.
pub fn end_session_of<I: Copy>(
    peer_id: u64,
    cause: EndCause,
    registry: &mut ConnectionRegistry,
    sessions: &mut SessionTable<I>,
) -> Option<SessionEnd> {
    let session_id = sessions.session_for_peer(peer_id)?.id;

    // Session exists: session_for_peer just found it
    let session = sessions.end(session_id)?;
    let partner_id = session.partner_of(peer_id)?;

    registry.set_status(peer_id, PeerStatus::Idle);
    registry.set_status(partner_id, PeerStatus::Idle);

    Some(SessionEnd { session_id, partner_id, cause })
}

/// Unwind all state held by a disconnecting peer.
///
/// Removes queue membership, tears down an active session if any, and
/// unregisters the peer. Idempotent: unwinding an unknown peer changes
/// nothing and reports `was_registered: false`.
pub fn handle_disconnect<I: Copy>(
    peer_id: u64,
    registry: &mut ConnectionRegistry,
    matchmaker: &mut Matchmaker,
    sessions: &mut SessionTable<I>,
) -> DisconnectOutcome {
    if !registry.has_peer(peer_id) {
        return DisconnectOutcome { was_registered: false, was_waiting: false, ended: None };
    }

    let was_waiting = matchmaker.remove(peer_id);
    let ended = end_session_of(peer_id, EndCause::Disconnect, registry, sessions);

    registry.unregister_peer(peer_id);

    DisconnectOutcome { was_registered: true, was_waiting, ended }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use pairlink_core::env::Environment;

    use super::*;

    const SESSION_ID: u128 = 0x9999_8888_7777_6666_5555_4444_3333_2222;

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
                *byte = (i as u8).wrapping_add(7);
            }
        }
    }

    fn paired_state() -> (ConnectionRegistry, Matchmaker, SessionTable<Instant>) {
        let mut registry = ConnectionRegistry::new();
        registry.register_peer(1);
        registry.register_peer(2);

        let mut sessions = SessionTable::new();
        assert!(sessions.create(SESSION_ID, [1, 2], 1, Instant::now()));
        registry.set_status(1, PeerStatus::InSession(SESSION_ID));
        registry.set_status(2, PeerStatus::InSession(SESSION_ID));

        (registry, Matchmaker::new(), sessions)
    }

    #[test]
    fn skip_ends_session_and_idles_both() {
        let (mut registry, _mm, mut sessions) = paired_state();

        let end = end_session_of(1, EndCause::Skip, &mut registry, &mut sessions).unwrap();
        assert_eq!(end, SessionEnd { session_id: SESSION_ID, partner_id: 2, cause: EndCause::Skip });

        assert_eq!(registry.status(1), Some(PeerStatus::Idle));
        assert_eq!(registry.status(2), Some(PeerStatus::Idle));
        assert_eq!(sessions.session_count(), 0);
    }

    #[test]
    fn end_session_without_session_is_noop() {
        let mut registry = ConnectionRegistry::new();
        registry.register_peer(1);
        let mut sessions: SessionTable<Instant> = SessionTable::new();

        assert!(end_session_of(1, EndCause::Skip, &mut registry, &mut sessions).is_none());
        assert_eq!(registry.status(1), Some(PeerStatus::Idle));
    }

    #[test]
    fn disconnect_while_paired_notifies_partner() {
        let (mut registry, mut mm, mut sessions) = paired_state();

        let outcome = handle_disconnect(1, &mut registry, &mut mm, &mut sessions);
        assert!(outcome.was_registered);
        assert!(!outcome.was_waiting);
        assert_eq!(
            outcome.ended,
            Some(SessionEnd { session_id: SESSION_ID, partner_id: 2, cause: EndCause::Disconnect })
        );

        // Disconnecting peer fully unregistered, partner back to idle
        assert!(!registry.has_peer(1));
        assert_eq!(registry.status(2), Some(PeerStatus::Idle));
        assert_eq!(sessions.session_count(), 0);
    }

    #[test]
    fn disconnect_while_waiting_clears_queue() {
        let env = TestEnv;
        let mut registry = ConnectionRegistry::new();
        registry.register_peer(1);
        let mut sessions: SessionTable<Instant> = SessionTable::new();
        let mut mm = Matchmaker::new();

        mm.join_queue(1, &mut registry, &mut sessions, &env);
        assert_eq!(mm.queue_len(), 1);

        let outcome = handle_disconnect(1, &mut registry, &mut mm, &mut sessions);
        assert!(outcome.was_registered);
        assert!(outcome.was_waiting);
        assert!(outcome.ended.is_none());
        assert!(!registry.has_peer(1));
        assert_eq!(mm.queue_len(), 0);
    }

    #[test]
    fn disconnect_unknown_peer_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let mut sessions: SessionTable<Instant> = SessionTable::new();
        let mut mm = Matchmaker::new();

        let outcome = handle_disconnect(42, &mut registry, &mut mm, &mut sessions);
        assert_eq!(
            outcome,
            DisconnectOutcome { was_registered: false, was_waiting: false, ended: None }
        );
    }

    #[test]
    fn teardown_cause_becomes_wire_reason() {
        assert_eq!(EndReason::from(EndCause::Skip), EndReason::Skip);
        assert_eq!(EndReason::from(EndCause::Disconnect), EndReason::Disconnect);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (mut registry, mut mm, mut sessions) = paired_state();

        let first = handle_disconnect(1, &mut registry, &mut mm, &mut sessions);
        assert!(first.was_registered);

        let second = handle_disconnect(1, &mut registry, &mut mm, &mut sessions);
        assert!(!second.was_registered);
        assert!(second.ended.is_none());
    }
}
