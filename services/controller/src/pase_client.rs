//! Commissioner side of the five-message PASE handshake: drives
//! `matter_session::pase::PaseInitiator` over unsecured frames against a
//! freshly-discovered device, the mirror image of `services/node`'s
//! `secure_channel::SecureChannelHandler` responder handlers.

use crate::error::ControllerError;
use crate::link::{self, SecureLink};
use matter_session::pase::{PaseInitiator, PbkdfParamResponse, PbkdfParams};
use matter_transport::{InboundMessage, UdpTransport};
use matter_wire::protocol::{secure_channel_opcode, SECURE_CHANNEL};
use matter_wire::{WirePake1, WirePake2, WirePake3, WirePbkdfParamRequest, WirePbkdfParamResponse, WireStatusReport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Exchange id this one-shot commissioner always uses for the handshake —
/// there is never a second concurrent PASE attempt in flight on this side.
const PASE_EXCHANGE_ID: u16 = 1;

/// Drives PASE to completion and returns the resulting secure link, ready
/// for `commissioning_client` to issue `ArmFailSafe`/`AddNOC` over.
pub async fn establish(
    transport: Arc<UdpTransport>,
    inbound: &mut mpsc::Receiver<InboundMessage>,
    peer_addr: SocketAddr,
    our_node_id: u64,
    peer_node_id: u64,
    passcode: u32,
) -> Result<SecureLink, ControllerError> {
    let initiator_session_id = rand::random::<u16>().max(1);

    let (request, _initiator_random) = PaseInitiator::build_request(initiator_session_id);
    let wire_request = WirePbkdfParamRequest {
        initiator_random: request.initiator_random.to_vec(),
        initiator_session_id: request.initiator_session_id,
        passcode_id: request.passcode_id,
        has_pbkdf_params: request.has_pbkdf_params,
    };
    let bytes = serde_json::to_vec(&wire_request).expect("WirePbkdfParamRequest always serializes");
    link::send_unsecured(&transport, peer_addr, our_node_id, PASE_EXCHANGE_ID, secure_channel_opcode::PBKDF_PARAM_REQUEST, 1, bytes).await?;
    info!(%peer_addr, "sent PbkdfParamRequest");

    let (_header, payload) = link::recv_unsecured(inbound, peer_addr).await?;
    let wire_response: WirePbkdfParamResponse =
        serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("PbkdfParamResponse: {e}")))?;
    let response = PbkdfParamResponse {
        responder_random: wire_response.responder_random.try_into().map_err(|_| ControllerError::MalformedMessage("responder_random length".to_owned()))?,
        responder_session_id: wire_response.responder_session_id,
        pbkdf_params: match (wire_response.pbkdf_iterations, wire_response.pbkdf_salt) {
            (Some(iterations), Some(salt)) => Some(PbkdfParams { iterations, salt }),
            _ => None,
        },
        responder_session_params: matter_session::OUR_DEFAULTS,
    };
    let responder_session_id = response.responder_session_id;

    let (mut initiator, pake1) = PaseInitiator::on_param_response(passcode, &response);
    let wire_pake1 = WirePake1 { x: pake1.x.to_vec() };
    let bytes = serde_json::to_vec(&wire_pake1).expect("WirePake1 always serializes");
    link::send_unsecured(&transport, peer_addr, our_node_id, PASE_EXCHANGE_ID, secure_channel_opcode::PASE_PAKE1, 2, bytes).await?;
    info!("sent Pake1");

    let (_header, payload) = link::recv_unsecured(inbound, peer_addr).await?;
    let wire_pake2: WirePake2 = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("Pake2: {e}")))?;
    let pake2 = matter_session::pase::Pake2 {
        y: wire_pake2.y.try_into().map_err(|_| ControllerError::MalformedMessage("pake2.y length".to_owned()))?,
        h_bx: wire_pake2.h_bx.try_into().map_err(|_| ControllerError::MalformedMessage("pake2.h_bx length".to_owned()))?,
    };
    let pake3 = initiator.on_pake2(&pake2)?;

    let wire_pake3 = WirePake3 { h_ay: pake3.h_ay.to_vec() };
    let bytes = serde_json::to_vec(&wire_pake3).expect("WirePake3 always serializes");
    link::send_unsecured(&transport, peer_addr, our_node_id, PASE_EXCHANGE_ID, secure_channel_opcode::PASE_PAKE3, 3, bytes).await?;
    info!("sent Pake3");

    let (header, payload) = link::recv_unsecured(inbound, peer_addr).await?;
    if header.opcode != secure_channel_opcode::STATUS_REPORT {
        return Err(ControllerError::MalformedMessage(format!("expected StatusReport, got opcode {}", header.opcode)));
    }
    let status: WireStatusReport = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("StatusReport: {e}")))?;
    if status.general_code != 0 {
        return Err(ControllerError::Rejected(format!("pase handshake failed: general_code {}", status.general_code)));
    }

    let derived = initiator.session_keys().expect("on_pake2 succeeded, so key agreement finished");

    // `PaseInitiator::session_keys()` returns the raw SPAKE2+ `Ke`, not
    // split session keys; `secure_channel.rs::handle_pake3` does this same
    // split on the device side, so this must match byte-for-byte.
    let okm = matter_crypto::hkdf_sha256(&derived.ke, &[], b"SessionKeys", 48).expect("fixed-length HKDF expand");
    let mut to_initiator = [0u8; 16];
    let mut to_responder = [0u8; 16];
    to_initiator.copy_from_slice(&okm[0..16]);
    to_responder.copy_from_slice(&okm[16..32]);

    // This side is the initiator: outgoing traffic is "to responder",
    // incoming traffic is "to initiator" — no swap needed (only the
    // responder side swaps, per `secure_channel.rs`'s comment).
    let encrypt_key = to_responder;
    let decrypt_key = to_initiator;

    info!(local_session_id = initiator_session_id, responder_session_id, "PASE session established");

    Ok(SecureLink::new(transport, peer_addr, our_node_id, peer_node_id, responder_session_id, encrypt_key, decrypt_key))
}
