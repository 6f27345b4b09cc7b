//! Group sessions (spec.md §4.D.3): multicast messages encrypted under an
//! Operational Group Key rather than a per-peer session key. Unlike
//! unicast sessions, group sessions carry no MRP (no ack, no retransmit)
//! and have no idle timeout — they exist for as long as the group key
//! that backs them is installed.

use crate::error::SessionError;
use matter_types::{FabricIndex, GroupId};
use std::collections::HashMap;

/// One epoch of an Operational Group Key, keyed by its 16-bit session id
/// derived from the key itself (spec.md §4.D.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupKey {
    pub group_session_id: u16,
    pub encrypt_key: [u8; 16],
    pub privacy_key: [u8; 16],
}

/// Per-source replay window (spec.md §4.D.3: "no per-peer session, so
/// replay protection is tracked per `(group, sourceNodeId)` instead").
#[derive(Debug, Default)]
struct ReplayWindow {
    highest_seen: Option<u32>,
}

impl ReplayWindow {
    /// Group messages are not retransmitted, so unlike MRP's dedup window
    /// (spec.md §4.C) this rejects anything at or below the highest counter
    /// seen from this source rather than tracking a sliding bitmask.
    fn accept(&mut self, counter: u32) -> bool {
        match self.highest_seen {
            Some(highest) if counter <= highest => false,
            _ => {
                self.highest_seen = Some(counter);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SourceKey {
    fabric_index: FabricIndex,
    group_id: GroupId,
    source_node_id: u64,
}

/// Owns every installed group key for this node and the replay windows
/// tracking inbound traffic under them.
#[derive(Default)]
pub struct GroupKeyStore {
    keys: HashMap<(FabricIndex, GroupId), Vec<GroupKey>>,
    replay: HashMap<SourceKey, ReplayWindow>,
}

impl GroupKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new key epoch for `(fabric, group)`. Old epochs are kept
    /// (not replaced) so in-flight messages encrypted under the previous
    /// epoch still decrypt during rollover.
    pub fn install(&mut self, fabric_index: FabricIndex, group_id: GroupId, key: GroupKey) {
        self.keys.entry((fabric_index, group_id)).or_default().push(key);
    }

    pub fn remove_group(&mut self, fabric_index: FabricIndex, group_id: GroupId) {
        self.keys.remove(&(fabric_index, group_id));
    }

    fn find_key(&self, fabric_index: FabricIndex, group_id: GroupId, group_session_id: u16) -> Option<&GroupKey> {
        self.keys.get(&(fabric_index, group_id))?.iter().find(|k| k.group_session_id == group_session_id)
    }

    /// Look up the decrypt key for an inbound group message and, if found,
    /// apply this source's replay check. Returns `GroupKeyNotFound` if no
    /// installed epoch matches `group_session_id`, or propagates a replay
    /// rejection as `false` via the returned bool without an error (replay
    /// is an expected, silently-dropped condition, not a protocol fault).
    pub fn accept_inbound(
        &mut self,
        fabric_index: FabricIndex,
        group_id: GroupId,
        group_session_id: u16,
        source_node_id: u64,
        message_counter: u32,
    ) -> Result<([u8; 16], bool), SessionError> {
        let key = self
            .find_key(fabric_index, group_id, group_session_id)
            .ok_or(SessionError::GroupKeyNotFound { group_id: group_id.value(), session_id: group_session_id })?;
        let decrypt_key = key.encrypt_key;
        let source = SourceKey { fabric_index, group_id, source_node_id };
        let accepted = self.replay.entry(source).or_default().accept(message_counter);
        Ok((decrypt_key, accepted))
    }

    pub fn encrypt_key_for_outbound(&self, fabric_index: FabricIndex, group_id: GroupId) -> Option<[u8; 16]> {
        self.keys.get(&(fabric_index, group_id))?.last().map(|k| k.encrypt_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric(i: u8) -> FabricIndex {
        FabricIndex::new(i).unwrap()
    }

    #[test]
    fn replay_window_rejects_non_increasing_counters() {
        let mut w = ReplayWindow::default();
        assert!(w.accept(10));
        assert!(w.accept(11));
        assert!(!w.accept(11));
        assert!(!w.accept(5));
        assert!(w.accept(12));
    }

    #[test]
    fn accept_inbound_rejects_replays_per_source_independently() {
        let mut store = GroupKeyStore::new();
        let f = fabric(1);
        let g = GroupId(42);
        store.install(f, g, GroupKey { group_session_id: 7, encrypt_key: [1; 16], privacy_key: [2; 16] });

        let (_key, ok1) = store.accept_inbound(f, g, 7, 100, 5).unwrap();
        assert!(ok1);
        let (_key, replay) = store.accept_inbound(f, g, 7, 100, 5).unwrap();
        assert!(!replay);
        // A different source's counter space is independent.
        let (_key, ok2) = store.accept_inbound(f, g, 7, 200, 5).unwrap();
        assert!(ok2);
    }

    #[test]
    fn unknown_group_session_id_is_reported_not_silently_dropped() {
        let mut store = GroupKeyStore::new();
        let f = fabric(1);
        let g = GroupId(42);
        let err = store.accept_inbound(f, g, 99, 1, 1).unwrap_err();
        assert!(matches!(err, SessionError::GroupKeyNotFound { group_id: 42, session_id: 99 }));
    }

    #[test]
    fn key_rollover_keeps_old_epoch_usable() {
        let mut store = GroupKeyStore::new();
        let f = fabric(1);
        let g = GroupId(1);
        store.install(f, g, GroupKey { group_session_id: 1, encrypt_key: [0xAA; 16], privacy_key: [0; 16] });
        store.install(f, g, GroupKey { group_session_id: 2, encrypt_key: [0xBB; 16], privacy_key: [0; 16] });

        let (old_key, _) = store.accept_inbound(f, g, 1, 1, 1).unwrap();
        assert_eq!(old_key, [0xAA; 16]);
        assert_eq!(store.encrypt_key_for_outbound(f, g), Some([0xBB; 16]));
    }
}
