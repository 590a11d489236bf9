//! The checks run against every published snapshot.

use std::collections::{BTreeSet, HashSet};

use huddle_client::{ConnectionState, SessionPhase};

use super::{ClientSnapshot, Invariant, InvariantResult, SystemSnapshot, Violation};

/// Room id and identity are present together, and only in room phases.
///
/// A frontend must never see a room without the identity used in it, or the
/// reverse.
pub struct MembershipAtomic;

impl Invariant for MembershipAtomic {
    fn name(&self) -> &'static str {
        "MembershipAtomic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let snap = &client.state;
            let in_room_phase = matches!(
                snap.phase,
                SessionPhase::InRoom | SessionPhase::Resuming | SessionPhase::DisconnectedInRoom
            );

            if snap.room_id.is_some() != snap.identity.is_some() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: room_id {:?} but identity {:?}",
                        client.id, snap.room_id, snap.identity
                    ),
                });
            }

            if snap.room_id.is_some() != in_room_phase {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: phase {:?} with room_id {:?}",
                        client.id, snap.phase, snap.room_id
                    ),
                });
            }

            if snap.room_id.is_none() && !(snap.roster.is_empty() && snap.messages.is_empty()) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: no room but {} roster entries and {} messages",
                        client.id,
                        snap.roster.len(),
                        snap.messages.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No two log entries share a permanent id.
pub struct UniquePermIds;

impl Invariant for UniquePermIds {
    fn name(&self) -> &'static str {
        "UniquePermIds"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for message in &client.state.messages {
                if !seen.insert(message.perm_id.as_str()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: perm_id {} appears twice",
                            client.id, message.perm_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Log timestamps never decrease in display order.
pub struct TimestampsMonotonic;

impl Invariant for TimestampsMonotonic {
    fn name(&self) -> &'static str {
        "TimestampsMonotonic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for window in client.state.messages.windows(2) {
                if window[1].timestamp < window[0].timestamp {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: {} at {} follows {} at {}",
                            client.id,
                            window[1].perm_id,
                            window[1].timestamp,
                            window[0].perm_id,
                            window[0].timestamp
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The reported connection state agrees with the phase.
pub struct PhaseMatchesConnection;

impl Invariant for PhaseMatchesConnection {
    fn name(&self) -> &'static str {
        "PhaseMatchesConnection"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let snap = &client.state;
            let consistent = match snap.phase {
                SessionPhase::Idle => snap.connection == ConnectionState::Disconnected,
                SessionPhase::Connecting => snap.connection == ConnectionState::Connecting,
                SessionPhase::Ready | SessionPhase::InRoom | SessionPhase::Resuming => {
                    snap.connection == ConnectionState::Connected
                },
                SessionPhase::DisconnectedInRoom => snap.connection != ConnectionState::Connected,
            };

            if !consistent {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: phase {:?} with connection {:?}",
                        client.id, snap.phase, snap.connection
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Typing indicators only show while the room is live.
///
/// Losing the link clears them.
pub struct TypingRequiresRoom;

impl Invariant for TypingRequiresRoom {
    fn name(&self) -> &'static str {
        "TypingRequiresRoom"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let snap = &client.state;
            let live = matches!(snap.phase, SessionPhase::InRoom | SessionPhase::Resuming);
            if snap.anyone_typing && !live {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: typing shown in phase {:?}", client.id, snap.phase),
                });
            }
        }
        Ok(())
    }
}

/// Connected clients in the same room agree on its roster.
///
/// Only holds once traffic has settled; check it at quiescent points.
pub struct RosterAgreement;

impl Invariant for RosterAgreement {
    fn name(&self) -> &'static str {
        "RosterAgreement"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let rooms: BTreeSet<&str> =
            state.clients.iter().filter_map(|c| c.state.room_id.as_deref()).collect();

        for room_id in rooms {
            let mut live = state.in_room(room_id).filter(|c| c.state.phase == SessionPhase::InRoom);
            let Some(first) = live.next() else {
                continue;
            };
            let expected = roster_ids(first);

            for other in live {
                let seen = roster_ids(other);
                if seen != expected {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "room {room_id}: client {} sees {expected:?}, client {} sees {seen:?}",
                            first.id, other.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

fn roster_ids(client: &ClientSnapshot) -> BTreeSet<u64> {
    client.state.roster.iter().map(|p| p.id).collect()
}
