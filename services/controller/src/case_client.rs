//! Commissioner side of the three-message CASE Sigma handshake.
//!
//! This demo's devices self-issue their own NOC/RCAC rather than receiving
//! a CA-signed certificate (`services/node::identity::NodeIdentity::rcac`
//! returns a fixed placeholder), so the controller does the same via
//! `crate::identity::ControllerIdentity` — both ends only need
//! `NoopCertificateVerifier` to accept a non-empty chain, not a real trust
//! anchor.

use crate::error::ControllerError;
use crate::identity::ControllerIdentity;
use crate::link::{self, SecureLink};
use matter_session::case::{CaseInitiator, NoopCertificateVerifier, Sigma2};
use matter_session::Sigma3;
use matter_transport::{InboundMessage, UdpTransport};
use matter_wire::protocol::secure_channel_opcode;
use matter_wire::{WireSigma1, WireSigma2, WireSigma3, WireStatusReport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

const CASE_EXCHANGE_ID: u16 = 1;

/// Placeholder root public key shared by every fabric member in this demo
/// (no real RCAC key material exists to hash into the destination id).
const PLACEHOLDER_ROOT_PUBLIC_KEY: &[u8] = &[0x01];

#[allow(clippy::too_many_arguments)]
pub async fn establish(
    transport: Arc<UdpTransport>,
    inbound: &mut mpsc::Receiver<InboundMessage>,
    peer_addr: SocketAddr,
    identity: &ControllerIdentity,
    peer_node_id: u64,
    fabric_id: u64,
    ipk: [u8; 16],
) -> Result<SecureLink, ControllerError> {
    let initiator_session_id = rand::random::<u16>().max(1);

    let (initiator, sigma1) =
        CaseInitiator::build_sigma1(initiator_session_id, &ipk, PLACEHOLDER_ROOT_PUBLIC_KEY, fabric_id, peer_node_id, None);

    let wire_sigma1 = WireSigma1 {
        initiator_random: sigma1.initiator_random.to_vec(),
        initiator_session_id: sigma1.initiator_session_id,
        destination_id: sigma1.destination_id.to_vec(),
        initiator_eph_public_key: sigma1.initiator_eph_public_key.to_vec(),
        resumption_id: sigma1.resumption_id.map(|v| v.to_vec()),
        resume_mic: sigma1.resume_mic.map(|v| v.to_vec()),
    };
    let bytes = serde_json::to_vec(&wire_sigma1).expect("WireSigma1 always serializes");
    link::send_unsecured(&transport, peer_addr, identity.node_id.value(), CASE_EXCHANGE_ID, secure_channel_opcode::CASE_SIGMA1, 1, bytes).await?;
    info!(%peer_addr, "sent Sigma1");

    let (header, payload) = link::recv_unsecured(inbound, peer_addr).await?;
    if header.opcode != secure_channel_opcode::CASE_SIGMA2 {
        return Err(ControllerError::MalformedMessage(format!("expected Sigma2, got opcode {}", header.opcode)));
    }
    let wire_sigma2: WireSigma2 = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("Sigma2: {e}")))?;
    let signature = p256::ecdsa::Signature::try_from(wire_sigma2.signature.as_slice())
        .map_err(|_| ControllerError::MalformedMessage("malformed sigma2 signature".to_owned()))?;
    let sigma2 = Sigma2 {
        responder_random: wire_sigma2.responder_random.try_into().map_err(|_| ControllerError::MalformedMessage("sigma2.responder_random length".to_owned()))?,
        responder_session_id: wire_sigma2.responder_session_id,
        responder_eph_public_key: wire_sigma2
            .responder_eph_public_key
            .try_into()
            .map_err(|_| ControllerError::MalformedMessage("sigma2.responder_eph_public_key length".to_owned()))?,
        responder_noc: wire_sigma2.responder_noc,
        responder_icac: wire_sigma2.responder_icac,
        responder_rcac: wire_sigma2.responder_rcac,
        signature,
    };
    let responder_session_id = sigma2.responder_session_id;

    let verifier = NoopCertificateVerifier;
    let (keys, peer_identity, _sigma3_builder) = initiator.on_sigma2(&sigma2, &verifier, fabric_id, &ipk)?;
    info!(peer_node_id = peer_identity.node_id.value(), "verified node's Sigma2 certificate chain");

    let signature = identity.signing_key.sign(&sigma1.initiator_eph_public_key);
    let sigma3 = Sigma3 { initiator_noc: identity.noc(), initiator_icac: None, initiator_rcac: identity.rcac(), signature };
    let wire_sigma3 = WireSigma3 {
        initiator_noc: sigma3.initiator_noc,
        initiator_icac: sigma3.initiator_icac,
        initiator_rcac: sigma3.initiator_rcac,
        signature: sigma3.signature.to_bytes().to_vec(),
    };
    let bytes = serde_json::to_vec(&wire_sigma3).expect("WireSigma3 always serializes");
    link::send_unsecured(&transport, peer_addr, identity.node_id.value(), CASE_EXCHANGE_ID, secure_channel_opcode::CASE_SIGMA3, 2, bytes).await?;
    info!("sent Sigma3");

    let (header, payload) = link::recv_unsecured(inbound, peer_addr).await?;
    if header.opcode != secure_channel_opcode::STATUS_REPORT {
        return Err(ControllerError::MalformedMessage(format!("expected StatusReport, got opcode {}", header.opcode)));
    }
    let status: WireStatusReport = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("StatusReport: {e}")))?;
    if status.general_code != 0 {
        return Err(ControllerError::Rejected(format!("case handshake failed: general_code {}", status.general_code)));
    }

    // `derive_case_keys` names fields by *direction* ("to_responder" is
    // `encrypt`, "to_initiator" is `decrypt`), computed identically on both
    // ends — this side is the initiator, so no swap is needed (unlike
    // `secure_channel.rs::handle_sigma3`, which is the responder).
    info!(local_session_id = initiator_session_id, responder_session_id, "CASE session established");

    Ok(SecureLink::new(transport, peer_addr, identity.node_id.value(), peer_node_id, responder_session_id, keys.encrypt, keys.decrypt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_root_key_is_nonempty() {
        assert!(!PLACEHOLDER_ROOT_PUBLIC_KEY.is_empty());
    }
}
