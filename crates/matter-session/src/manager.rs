//! `SessionManager` (spec.md §3 "Ownership rules": "SessionManager
//! exclusively owns all Sessions"). Sessions live in a generational arena
//! (spec.md §9); `localSessionId` and `(peerAddress, peerSessionId)` are
//! secondary indices into it.

use crate::error::SessionError;
use crate::session::Session;
use matter_types::{Arena, FabricIndex, Handle, NodeId};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// `(fabricIndex, nodeId)` indexing key for outgoing lookups. `fabric_index`
/// is `None` for PASE sessions, which precede fabric membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutgoingKey {
    pub fabric_index: Option<FabricIndex>,
    pub peer_node_id: Option<NodeId>,
    pub peer_session_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDestroyed {
    pub handle: Handle<Session>,
    pub local_session_id: u16,
}

struct Indices {
    by_local_id: HashMap<u16, Handle<Session>>,
    by_outgoing_key: HashMap<OutgoingKey, Handle<Session>>,
}

pub struct SessionManager {
    arena: RwLock<Arena<Session>>,
    indices: RwLock<Indices>,
    destroyed: broadcast::Sender<SessionDestroyed>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        let (destroyed, _rx) = broadcast::channel(128);
        SessionManager {
            arena: RwLock::new(Arena::new()),
            indices: RwLock::new(Indices { by_local_id: HashMap::new(), by_outgoing_key: HashMap::new() }),
            destroyed,
        }
    }

    pub fn subscribe_destroyed(&self) -> broadcast::Receiver<SessionDestroyed> {
        self.destroyed.subscribe()
    }

    /// Pick a random, currently-unused `localSessionId` (never `0`, which
    /// is reserved for the unsecured session).
    pub fn allocate_local_session_id(&self) -> u16 {
        let indices = self.indices.read().expect("lock poisoned");
        loop {
            let candidate: u16 = rand::thread_rng().gen_range(1..=u16::MAX);
            if !indices.by_local_id.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn insert(&self, session: Session) -> Handle<Session> {
        let local_id = session.local_session_id;
        let outgoing_key = OutgoingKey {
            fabric_index: session.fabric_index,
            peer_node_id: session.peer_node_id,
            peer_session_id: session.peer_session_id,
        };
        let handle = self.arena.write().expect("lock poisoned").insert(session);
        let mut indices = self.indices.write().expect("lock poisoned");
        indices.by_local_id.insert(local_id, handle);
        indices.by_outgoing_key.insert(outgoing_key, handle);
        info!(local_session_id = local_id, "session established");
        handle
    }

    pub fn get(&self, handle: Handle<Session>) -> Option<()> {
        self.arena.read().expect("lock poisoned").contains(handle).then_some(())
    }

    pub fn with_session<R>(&self, handle: Handle<Session>, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.arena.read().expect("lock poisoned").get(handle).map(f)
    }

    pub fn with_session_mut<R>(&self, handle: Handle<Session>, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.arena.write().expect("lock poisoned").get_mut(handle).map(f)
    }

    pub fn by_local_session_id(&self, local_session_id: u16) -> Result<Handle<Session>, SessionError> {
        self.indices
            .read()
            .expect("lock poisoned")
            .by_local_id
            .get(&local_session_id)
            .copied()
            .ok_or(SessionError::UnknownLocalSessionId(local_session_id))
    }

    pub fn by_outgoing_key(&self, key: OutgoingKey) -> Option<Handle<Session>> {
        self.indices.read().expect("lock poisoned").by_outgoing_key.get(&key).copied()
    }

    /// Explicit shutdown / peer loss / timeout (spec.md §3 lifecycle).
    pub fn destroy(&self, handle: Handle<Session>) -> bool {
        let removed = {
            let mut arena = self.arena.write().expect("lock poisoned");
            arena.remove(handle)
        };
        let Some(session) = removed else { return false };
        let mut indices = self.indices.write().expect("lock poisoned");
        indices.by_local_id.remove(&session.local_session_id);
        indices.by_outgoing_key.remove(&OutgoingKey {
            fabric_index: session.fabric_index,
            peer_node_id: session.peer_node_id,
            peer_session_id: session.peer_session_id,
        });
        let _ = self.destroyed.send(SessionDestroyed { handle, local_session_id: session.local_session_id });
        true
    }

    /// Fabric removal cascade (spec.md §4.E): destroy every session bound
    /// to `fabric_index`. Callers wire `FabricRegistry`'s `Deleted` event to
    /// this.
    pub fn destroy_all_for_fabric(&self, fabric_index: FabricIndex) -> usize {
        let handles: Vec<Handle<Session>> = {
            let arena = self.arena.read().expect("lock poisoned");
            arena.iter().filter(|(_, s)| s.fabric_index == Some(fabric_index)).map(|(h, _)| h).collect()
        };
        let count = handles.len();
        if count > 0 {
            warn!(fabric_index = fabric_index.value(), count, "cascading session teardown for removed fabric");
        }
        for handle in handles {
            self.destroy(handle);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.arena.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
