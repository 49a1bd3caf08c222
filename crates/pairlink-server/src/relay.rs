//! Relay routing checks for signaling and chat frames.
//!
//! Payload bytes are never parsed here. Routing decisions use only the frame
//! header and the shared matchmaking state, so the relay stays agnostic to
//! the signaling protocol's internal schema.
//!
//! Delivery is at-most-once and best-effort: no acknowledgement, retry, or
//! buffering. Per-sender ordering is preserved by the transport reading each
//! peer's frames sequentially.

use crate::session_table::SessionTable;

/// Why a relay frame was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayReject {
    /// Sender has no active session.
    NotInSession,
    /// Explicit target is not the sender's session partner.
    ///
    /// Enforced so signaling cannot be directed outside the paired session.
    UnknownTarget {
        /// The target id the sender asked for.
        target_id: u64,
    },
}

/// Resolved delivery route for an accepted relay frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayRoute {
    /// Peer the frame is delivered to.
    pub target_id: u64,
    /// Session scoping the delivery.
    pub session_id: u128,
}

/// Route a signaling frame (offer, answer, candidate).
///
/// The sender must be in a session and the explicit `target_id` must be its
/// current partner.
///
/// # Errors
///
/// - [`RelayReject::NotInSession`] if the sender has no active session
/// - [`RelayReject::UnknownTarget`] if `target_id` is not the partner
pub fn route_signal<I: Copy>(
    sender_id: u64,
    target_id: u64,
    sessions: &SessionTable<I>,
) -> Result<RelayRoute, RelayReject> {
    let session = sessions.session_for_peer(sender_id).ok_or(RelayReject::NotInSession)?;

    // partner_of is Some: session_for_peer proved membership
    if session.partner_of(sender_id) != Some(target_id) {
        return Err(RelayReject::UnknownTarget { target_id });
    }

    Ok(RelayRoute { target_id, session_id: session.id })
}

/// Route a chat frame.
///
/// Chat carries no explicit target; it always goes to the sender's current
/// partner. Messages sent while idle or waiting are refused, never broadcast.
///
/// # Errors
///
/// - [`RelayReject::NotInSession`] if the sender has no active session
pub fn route_chat<I: Copy>(
    sender_id: u64,
    sessions: &SessionTable<I>,
) -> Result<RelayRoute, RelayReject> {
    let session = sessions.session_for_peer(sender_id).ok_or(RelayReject::NotInSession)?;

    let Some(target_id) = session.partner_of(sender_id) else {
        return Err(RelayReject::NotInSession);
    };

    Ok(RelayRoute { target_id, session_id: session.id })
}
