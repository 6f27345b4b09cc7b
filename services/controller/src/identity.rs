//! This commissioner's own operational identity: a signing keypair plus
//! the `noc`/`rcac` byte strings `matter_session::case`'s
//! `NoopCertificateVerifier` understands (`noc = nodeId_be ‖ pubkey`,
//! `rcac` non-empty). Mirrors `services/node`'s `identity::NodeIdentity` —
//! both ends of a CASE handshake need the same self-issued-certificate
//! convention, since real CSR issuance by a Certificate Authority is out
//! of this workspace's scope.

use matter_crypto::ecc::KeyPair;
use matter_types::NodeId;

pub struct ControllerIdentity {
    pub node_id: NodeId,
    pub signing_key: KeyPair,
}

impl ControllerIdentity {
    pub fn new(node_id: NodeId) -> Self {
        ControllerIdentity { node_id, signing_key: KeyPair::generate() }
    }

    pub fn noc(&self) -> Vec<u8> {
        let mut noc = self.node_id.value().to_be_bytes().to_vec();
        noc.extend_from_slice(&self.signing_key.public_key_bytes());
        noc
    }

    /// Same fixed placeholder `services/node`'s devices issue themselves —
    /// `NoopCertificateVerifier` only checks it's non-empty, so every demo
    /// participant can share this one constant instead of exchanging root
    /// certificate bytes over the wire.
    pub fn rcac(&self) -> Vec<u8> {
        vec![0x01]
    }
}
