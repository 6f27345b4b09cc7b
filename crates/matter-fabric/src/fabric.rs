//! The `Fabric` record (spec.md §3).

use matter_types::{FabricIndex, NodeId, VendorId};

/// A joined administrative domain. See spec.md §3 for the invariants:
/// `(rootPublicKey, fabricId)` unique per node, `fabricIndex` stable across
/// restarts, `operationalIdentityProtectionKey` immutable for the fabric's
/// life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fabric {
    pub fabric_index: FabricIndex,
    pub fabric_id: u64,
    pub root_public_key: Vec<u8>,
    pub root_vendor_id: VendorId,
    pub compressed_fabric_id: [u8; 8],
    pub node_id: NodeId,
    pub operational_identity_protection_key: [u8; 16],
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    pub rcac: Vec<u8>,
    pub label: String,
}

impl Fabric {
    /// `(rootPublicKey, fabricId)` — the tuple spec.md §3 requires unique
    /// per node.
    pub fn identity_key(&self) -> (&[u8], u64) {
        (&self.root_public_key, self.fabric_id)
    }
}
