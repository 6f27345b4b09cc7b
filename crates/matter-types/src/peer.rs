//! `PeerAddress` — the `(fabricIndex, nodeId)` tuple used to index sessions,
//! fabrics and subscriptions (spec.md §3).

use crate::ids::{FabricIndex, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub fabric_index: FabricIndex,
    pub node_id: NodeId,
}

impl PeerAddress {
    pub fn new(fabric_index: FabricIndex, node_id: NodeId) -> Self {
        PeerAddress { fabric_index, node_id }
    }
}

/// Deterministic string form used for log correlation and map keys when a
/// `Hash` impl isn't convenient (e.g. across an FFI or HTTP boundary).
impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fabric_index, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_form_is_stable_and_distinct() {
        let a = PeerAddress::new(FabricIndex::new(1).unwrap(), NodeId(42));
        let b = PeerAddress::new(FabricIndex::new(2).unwrap(), NodeId(42));
        assert_eq!(a.to_string(), "1:42");
        assert_ne!(a.to_string(), b.to_string());
    }
}
