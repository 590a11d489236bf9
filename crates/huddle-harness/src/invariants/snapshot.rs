//! What the invariants look at.
//!
//! Checks see exactly the [`RoomSnapshot`]s a frontend would render, one per
//! simulated client, never the session internals.

use huddle_app::RoomSnapshot;

/// Every client's latest published snapshot.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// One entry per client, in client order
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// No clients at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A lone client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Several clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }

    /// Clients whose snapshot names `room_id`, in any phase.
    pub fn in_room<'a>(&'a self, room_id: &'a str) -> impl Iterator<Item = &'a ClientSnapshot> {
        self.clients.iter().filter(move |c| c.state.room_id.as_deref() == Some(room_id))
    }
}

/// A client's id in the cluster and what it published.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Index in the cluster
    pub id: u64,
    /// Latest published snapshot
    pub state: RoomSnapshot,
}

impl ClientSnapshot {
    /// Pair `state` with the client that published it.
    pub fn new(id: u64, state: RoomSnapshot) -> Self {
        Self { id, state }
    }
}
