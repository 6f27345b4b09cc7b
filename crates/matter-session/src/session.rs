//! The `Session` record (spec.md §3): common fields shared by every
//! variant, plus the variant tag.

use crate::params::SessionParameters;
use matter_codec::MessageCounter;
use matter_types::{FabricIndex, NodeId};
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Unsecure,
    Pase,
    Case,
    Group,
}

/// A secure (or unsecure, pre-handshake) session (spec.md §3).
pub struct Session {
    pub kind: SessionKind,
    pub local_session_id: u16,
    pub peer_session_id: u16,
    pub peer_node_id: Option<NodeId>,
    /// Present once the session is bound to a joined fabric (PASE sessions
    /// are not; they precede fabric membership).
    pub fabric_index: Option<FabricIndex>,
    pub encrypt_key: [u8; 16],
    pub decrypt_key: [u8; 16],
    /// `Ke` from SPAKE2+/Sigma — used later for Vendor-ID Verification
    /// signatures (spec.md §4.D.2).
    pub attestation_challenge: [u8; 32],
    pub send_counter: MessageCounter,
    pub parameters: SessionParameters,
}

impl Session {
    pub fn new(
        kind: SessionKind,
        local_session_id: u16,
        peer_session_id: u16,
        peer_node_id: Option<NodeId>,
        fabric_index: Option<FabricIndex>,
        encrypt_key: [u8; 16],
        decrypt_key: [u8; 16],
        attestation_challenge: [u8; 32],
        initial_counter: u32,
        parameters: SessionParameters,
    ) -> Self {
        Session {
            kind,
            local_session_id,
            peer_session_id,
            peer_node_id,
            fabric_index,
            encrypt_key,
            decrypt_key,
            attestation_challenge,
            send_counter: MessageCounter::new(initial_counter),
            parameters,
        }
    }

    pub fn is_secure(&self) -> bool {
        !matches!(self.kind, SessionKind::Unsecure)
    }
}

/// Session keys and the attestation challenge are secret for the life of
/// the session; `SessionManager::destroy` drops the arena slot, so this
/// is where they actually get wiped.
impl Drop for Session {
    fn drop(&mut self) {
        self.encrypt_key.zeroize();
        self.decrypt_key.zeroize();
        self.attestation_challenge.zeroize();
    }
}
