//! Property-based tests for matchmaking behavior.
//!
//! Drives the server driver with generated populations and churn, checking
//! the pairing invariants: FIFO order, exactly-two sessions, and clean state
//! after arbitrary disconnect interleavings.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use pairlink_core::env::Environment;
use pairlink_proto::{Frame, FrameHeader, Opcode, Payload, payloads::Hello};
use pairlink_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded environment so session ids are reproducible per proptest case.
#[derive(Clone)]
struct SeededEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Environment for SeededEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

fn driver(seed: u64) -> ServerDriver<SeededEnv> {
    ServerDriver::new(SeededEnv::new(seed), DriverConfig::default())
}

fn connect(d: &mut ServerDriver<SeededEnv>, peer_id: u64) {
    d.process_event(ServerEvent::ConnectionAccepted { peer_id }).unwrap();
    let hello =
        Payload::Hello(Hello { version: 1 }).into_frame(FrameHeader::new(Opcode::Hello)).unwrap();
    d.process_event(ServerEvent::FrameReceived { peer_id, frame: hello }).unwrap();
}

fn join(d: &mut ServerDriver<SeededEnv>, peer_id: u64) -> Vec<ServerAction> {
    let frame = Frame::new(FrameHeader::new(Opcode::JoinQueue), Vec::new());
    d.process_event(ServerEvent::FrameReceived { peer_id, frame }).unwrap()
}

fn disconnect(d: &mut ServerDriver<SeededEnv>, peer_id: u64) -> Vec<ServerAction> {
    d.process_event(ServerEvent::ConnectionClosed { peer_id, reason: "gone".to_string() })
        .unwrap()
}

/// Extract the Matched payload sent to `peer_id`, if any.
fn matched_for(actions: &[ServerAction], peer_id: u64) -> Option<(u128, [u64; 2], u64)> {
    actions.iter().find_map(|a| match a {
        ServerAction::SendToPeer { peer_id: p, frame } if *p == peer_id => {
            match Payload::from_frame(frame).ok()? {
                Payload::Matched(m) => Some((m.session_id, m.participants, m.initiator_id)),
                _ => None,
            }
        },
        _ => None,
    })
}

proptest! {
    /// N sequential joins produce floor(N/2) sessions and N mod 2 waiters.
    #[test]
    fn sequential_joins_drain_pairwise(n in 0usize..40, seed in any::<u64>()) {
        let mut d = driver(seed);

        for peer_id in 1..=n as u64 {
            connect(&mut d, peer_id);
            join(&mut d, peer_id);
        }

        prop_assert_eq!(d.session_count(), n / 2);
        prop_assert_eq!(d.peer_count(), n);
    }

    /// Pairing is FIFO: peer 2k-1 pairs with peer 2k, and the earlier
    /// arrival is always the initiator.
    #[test]
    fn pairing_is_fifo_with_earliest_initiator(pairs in 1usize..12, seed in any::<u64>()) {
        let mut d = driver(seed);
        let mut session_ids = Vec::new();

        for k in 0..pairs as u64 {
            let first = 2 * k + 1;
            let second = 2 * k + 2;

            connect(&mut d, first);
            connect(&mut d, second);

            let actions = join(&mut d, first);
            prop_assert!(matched_for(&actions, first).is_none());

            let actions = join(&mut d, second);
            let (session_id, participants, initiator_id) =
                matched_for(&actions, second).expect("second join must match");

            prop_assert_eq!(participants, [first, second]);
            prop_assert_eq!(initiator_id, first);
            prop_assert_eq!(matched_for(&actions, first), Some((session_id, participants, initiator_id)));

            session_ids.push(session_id);
        }

        // Session ids never collide
        session_ids.sort_unstable();
        session_ids.dedup();
        prop_assert_eq!(session_ids.len(), pairs);
        prop_assert_eq!(d.session_count(), pairs);
    }

    /// Arbitrary disconnect churn never corrupts the queue: survivors and
    /// newcomers still pair off, and nothing is ever sent to departed peers.
    #[test]
    fn disconnect_churn_leaves_consistent_state(
        n in 2usize..20,
        leavers in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
        seed in any::<u64>(),
    ) {
        let mut d = driver(seed);

        for peer_id in 1..=n as u64 {
            connect(&mut d, peer_id);
            join(&mut d, peer_id);
        }

        let mut departed = Vec::new();
        for idx in &leavers {
            let peer_id = idx.index(n) as u64 + 1;
            if !departed.contains(&peer_id) {
                let actions = disconnect(&mut d, peer_id);
                for a in &actions {
                    if let ServerAction::SendToPeer { peer_id: p, .. } = a {
                        prop_assert!(!departed.contains(p));
                        prop_assert_ne!(*p, peer_id);
                    }
                }
                departed.push(peer_id);
            }
        }

        prop_assert_eq!(d.peer_count(), n - departed.len());

        // Everyone left idle by the churn can re-pair
        let survivors: Vec<u64> =
            (1..=n as u64).filter(|id| !departed.contains(id)).collect();
        for peer_id in &survivors {
            let actions = join(&mut d, *peer_id);
            for a in &actions {
                if let ServerAction::SendToPeer { peer_id: p, .. } = a {
                    prop_assert!(!departed.contains(p));
                }
            }
        }

        // A session holds exactly two peers, so at most one survivor waits
        prop_assert!(d.session_count() <= survivors.len() / 2 + survivors.len() % 2);
    }

    /// Repeated joins from the same peer never create extra sessions.
    #[test]
    fn duplicate_joins_are_idempotent(repeats in 2usize..6, seed in any::<u64>()) {
        let mut d = driver(seed);
        connect(&mut d, 1);
        connect(&mut d, 2);

        for _ in 0..repeats {
            join(&mut d, 1);
        }
        join(&mut d, 2);
        for _ in 0..repeats {
            join(&mut d, 2);
        }

        prop_assert_eq!(d.session_count(), 1);
    }
}
