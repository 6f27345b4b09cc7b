//! This node's operational identity: a signing keypair plus the
//! `noc`/`icac`/`rcac` byte strings `matter_session::case`'s
//! `NoopCertificateVerifier` understands (`noc = nodeId_be ‖ pubkey`,
//! `rcac` non-empty). Real DER certificate issuance by a Certificate
//! Authority is out of scope (spec.md §1) — this stands in for both the
//! commissionee's device attestation identity and, post-`AddNOC`, its
//! operational identity on the joined fabric.

use matter_crypto::ecc::KeyPair;
use matter_types::NodeId;

pub struct NodeIdentity {
    pub node_id: NodeId,
    pub signing_key: KeyPair,
}

impl NodeIdentity {
    pub fn new(node_id: NodeId) -> Self {
        NodeIdentity { node_id, signing_key: KeyPair::generate() }
    }

    /// The self-issued `noc` bytes `NoopCertificateVerifier` round-trips.
    pub fn noc(&self) -> Vec<u8> {
        let mut noc = self.node_id.value().to_be_bytes().to_vec();
        noc.extend_from_slice(&self.signing_key.public_key_bytes());
        noc
    }

    /// Placeholder root CA certificate — never parsed, only checked
    /// non-empty by `NoopCertificateVerifier`.
    pub fn rcac(&self) -> Vec<u8> {
        vec![0x01]
    }
}
