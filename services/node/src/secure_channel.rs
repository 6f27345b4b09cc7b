//! The Secure Channel protocol handler (spec.md §4.D): PASE and CASE
//! responders wired to the exchange dispatch seam. This node only ever
//! plays the device/responder role in a handshake; `services/controller`
//! plays the commissioner/initiator role against it.
//!
//! Handshake messages ride unsecured frames (`matter-codec::Packet`,
//! session id 0) regardless of which exchange they belong to, so replies
//! are addressed by the peer's UDP socket address rather than by a
//! session handle — tracked per [`ExchangeKey`] in [`PeerRoutingTable`],
//! populated by `crate::context` as datagrams arrive.

use crate::frame;
use crate::identity::NodeIdentity;
use async_trait::async_trait;
use matter_codec::{PacketHeader, PayloadHeader, SecurityFlags};
use matter_crypto::spake2plus::derive_w0_w1;
use matter_exchange::{ExchangeKey, ProtocolHandler};
use matter_fabric::FabricRegistry;
use matter_session::pase::{Pake1, Pake2, Pake3};
use matter_session::{
    CaseResponder, NoopCertificateVerifier, PaseResponder, PaseWindow, PbkdfParams, Session, SessionKind,
    SessionManager, Sigma1, Sigma2, Sigma3, OUR_DEFAULTS,
};
use matter_transport::{Transport, UdpTransport};
use matter_types::Handle;
use matter_wire::protocol::{secure_channel_opcode, SECURE_CHANNEL};
use matter_wire::{
    WirePake1, WirePake2, WirePake3, WirePbkdfParamRequest, WirePbkdfParamResponse, WireSigma1, WireSigma2,
    WireSigma3, WireStatusReport,
};
use p256::ecdsa::Signature;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Peer UDP address for an in-flight unsecured exchange, keyed because the
/// single shared unsecured session handle is reused across every
/// concurrent commissioner — `exchange_id` is what actually distinguishes
/// them.
#[derive(Default)]
pub struct PeerRoutingTable {
    addrs: Mutex<HashMap<ExchangeKey, SocketAddr>>,
}

impl PeerRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: ExchangeKey, addr: SocketAddr) {
        self.addrs.lock().expect("lock poisoned").insert(key, addr);
    }

    pub fn get(&self, key: ExchangeKey) -> Option<SocketAddr> {
        self.addrs.lock().expect("lock poisoned").get(&key).copied()
    }

    pub fn remove(&self, key: ExchangeKey) {
        self.addrs.lock().expect("lock poisoned").remove(&key);
    }
}

enum PaseFlow {
    AwaitingPake1 { params: PbkdfParams, responder_session_id: u16, peer_session_id: u16 },
    AwaitingPake3 { responder: PaseResponder, responder_session_id: u16, peer_session_id: u16 },
}

struct CaseFlow {
    sigma1: Sigma1,
    sigma2: Sigma2,
    responder: CaseResponder,
    fabric: matter_fabric::Fabric,
    responder_session_id: u16,
    peer_session_id: u16,
}

pub struct SecureChannelHandler {
    transport: Arc<UdpTransport>,
    routing: Arc<PeerRoutingTable>,
    sessions: Arc<SessionManager>,
    fabrics: Arc<FabricRegistry>,
    identity: Arc<NodeIdentity>,
    unsecured_session: Handle<Session>,
    passcode: u32,
    pase_window: Mutex<Option<PaseWindow>>,
    pase_flows: Mutex<HashMap<ExchangeKey, PaseFlow>>,
    case_flows: Mutex<HashMap<ExchangeKey, CaseFlow>>,
}

impl SecureChannelHandler {
    pub fn new(
        transport: Arc<UdpTransport>,
        routing: Arc<PeerRoutingTable>,
        sessions: Arc<SessionManager>,
        fabrics: Arc<FabricRegistry>,
        identity: Arc<NodeIdentity>,
        unsecured_session: Handle<Session>,
        passcode: u32,
    ) -> Self {
        SecureChannelHandler {
            transport,
            routing,
            sessions,
            fabrics,
            identity,
            unsecured_session,
            passcode,
            pase_window: Mutex::new(None),
            pase_flows: Mutex::new(HashMap::new()),
            case_flows: Mutex::new(HashMap::new()),
        }
    }

    async fn reply(&self, key: ExchangeKey, opcode: u8, payload: Vec<u8>) {
        let Some(addr) = self.routing.get(key) else {
            warn!(exchange_id = key.exchange_id, "no known peer address to reply to");
            return;
        };
        let message_id = self
            .sessions
            .with_session_mut(self.unsecured_session, |s| s.send_counter.next())
            .unwrap_or(1);
        let packet_header = PacketHeader {
            session_id: 0,
            security_flags: SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false },
            message_id,
            source_node_id: Some(self.identity.node_id.value()),
            destination: None,
        };
        let payload_header = PayloadHeader {
            exchange_id: key.exchange_id,
            protocol_id: SECURE_CHANNEL,
            vendor_id: None,
            opcode,
            is_initiator: false,
            requires_ack: false,
            acknowledged_message_id: None,
        };
        match frame::encode_unsecured(packet_header, payload_header, payload) {
            Ok(bytes) => {
                if let Err(error) = self.transport.send(addr, &bytes).await {
                    warn!(%error, "failed to send secure channel reply");
                }
            }
            Err(error) => warn!(%error, "failed to encode secure channel reply"),
        }
    }

    fn record_pase_error(&self) {
        if let Some(window) = self.pase_window.lock().expect("lock poisoned").as_mut() {
            let _ = window.record_error();
        }
    }

    async fn handle_pbkdf_param_request(&self, key: ExchangeKey, payload: &[u8]) {
        let request: WirePbkdfParamRequest = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(error) => {
                warn!(%error, "malformed PbkdfParamRequest");
                return;
            }
        };

        let now = Instant::now();
        {
            let mut window = self.pase_window.lock().expect("lock poisoned");
            let w = window.get_or_insert_with(|| PaseWindow::open(now));
            if w.check_timeout(now).is_err() {
                warn!("pase window expired, ignoring new attempt");
                return;
            }
            if let Err(error) = w.try_begin() {
                warn!(%error, "pase window rejected concurrent attempt");
                return;
            }
        }

        let params = PbkdfParams::default();
        let responder_session_id = self.sessions.allocate_local_session_id();
        let response = PaseResponder::build_response(responder_session_id, params.clone(), OUR_DEFAULTS);
        self.pase_flows.lock().expect("lock poisoned").insert(
            key,
            PaseFlow::AwaitingPake1 { params, responder_session_id, peer_session_id: request.initiator_session_id },
        );

        let wire = WirePbkdfParamResponse {
            responder_random: response.responder_random.to_vec(),
            responder_session_id: response.responder_session_id,
            pbkdf_iterations: response.pbkdf_params.as_ref().map(|p| p.iterations),
            pbkdf_salt: response.pbkdf_params.as_ref().map(|p| p.salt.clone()),
        };
        let bytes = serde_json::to_vec(&wire).expect("WirePbkdfParamResponse always serializes");
        self.reply(key, secure_channel_opcode::PBKDF_PARAM_RESPONSE, bytes).await;
    }

    async fn handle_pake1(&self, key: ExchangeKey, payload: &[u8]) {
        let wire: WirePake1 = match serde_json::from_slice(payload) {
            Ok(w) => w,
            Err(error) => {
                warn!(%error, "malformed Pake1");
                return;
            }
        };
        let Some((params, responder_session_id, peer_session_id)) = (match self.pase_flows.lock().expect("lock poisoned").get(&key) {
            Some(PaseFlow::AwaitingPake1 { params, responder_session_id, peer_session_id }) => {
                Some((params.clone(), *responder_session_id, *peer_session_id))
            }
            _ => None,
        }) else {
            warn!("pake1 received with no pending pbkdf exchange");
            return;
        };
        let Ok(x) = wire.x.try_into() else {
            warn!("malformed pake1 share length");
            return;
        };

        let (w0, w1) = derive_w0_w1(self.passcode, &params.salt, params.iterations);
        let (responder, pake2) = match PaseResponder::on_pake1(w0, w1, &Pake1 { x }) {
            Ok(r) => r,
            Err(error) => {
                self.record_pase_error();
                warn!(%error, "pase pake1 key agreement failed");
                return;
            }
        };
        self.pase_flows
            .lock()
            .expect("lock poisoned")
            .insert(key, PaseFlow::AwaitingPake3 { responder, responder_session_id, peer_session_id });

        let wire_out = WirePake2 { y: pake2.y.to_vec(), h_bx: pake2.h_bx.to_vec() };
        let bytes = serde_json::to_vec(&wire_out).expect("WirePake2 always serializes");
        self.reply(key, secure_channel_opcode::PASE_PAKE2, bytes).await;
    }

    async fn handle_pake3(&self, key: ExchangeKey, payload: &[u8]) {
        let wire: WirePake3 = match serde_json::from_slice(payload) {
            Ok(w) => w,
            Err(error) => {
                warn!(%error, "malformed Pake3");
                return;
            }
        };
        let Ok(h_ay) = wire.h_ay.try_into() else {
            warn!("malformed pake3 mac length");
            return;
        };
        let Some((responder, responder_session_id, peer_session_id)) = (match self.pase_flows.lock().expect("lock poisoned").remove(&key) {
            Some(PaseFlow::AwaitingPake3 { responder, responder_session_id, peer_session_id }) => {
                Some((responder, responder_session_id, peer_session_id))
            }
            _ => None,
        }) else {
            warn!("pake3 received with no pending pake1 state");
            return;
        };

        let derived = match responder.on_pake3(&Pake3 { h_ay }) {
            Ok(d) => d,
            Err(error) => {
                self.record_pase_error();
                warn!(%error, "pase key confirmation failed");
                return;
            }
        };
        if let Some(window) = self.pase_window.lock().expect("lock poisoned").as_mut() {
            window.record_success();
        }

        let okm = matter_crypto::hkdf_sha256(&derived.ke, &[], b"SessionKeys", 48).expect("fixed-length HKDF expand");
        let mut to_initiator = [0u8; 16];
        let mut to_responder = [0u8; 16];
        to_initiator.copy_from_slice(&okm[0..16]);
        to_responder.copy_from_slice(&okm[16..32]);
        let mut attestation_challenge = [0u8; 32];
        attestation_challenge[0..16].copy_from_slice(&okm[32..48]);
        attestation_challenge[16..32].copy_from_slice(&matter_crypto::sha256(&derived.ke)[0..16]);

        let session = Session::new(
            SessionKind::Pase,
            responder_session_id,
            peer_session_id,
            None,
            None,
            to_initiator,
            to_responder,
            attestation_challenge,
            1,
            OUR_DEFAULTS,
        );
        self.sessions.insert(session);
        info!(local_session_id = responder_session_id, "PASE session established");

        let status = WireStatusReport { general_code: 0, protocol_id: u32::from(SECURE_CHANNEL), protocol_code: 0 };
        let bytes = serde_json::to_vec(&status).expect("WireStatusReport always serializes");
        self.reply(key, secure_channel_opcode::STATUS_REPORT, bytes).await;
    }

    async fn handle_sigma1(&self, key: ExchangeKey, payload: &[u8]) {
        let wire: WireSigma1 = match serde_json::from_slice(payload) {
            Ok(w) => w,
            Err(error) => {
                warn!(%error, "malformed Sigma1");
                return;
            }
        };
        let (Ok(initiator_random), Ok(destination_id), Ok(initiator_eph_public_key)) =
            (wire.initiator_random.try_into(), wire.destination_id.try_into(), wire.initiator_eph_public_key.try_into())
        else {
            warn!("malformed sigma1 field lengths");
            return;
        };
        let sigma1 = Sigma1 {
            initiator_random,
            initiator_session_id: wire.initiator_session_id,
            destination_id,
            initiator_eph_public_key,
            resumption_id: wire.resumption_id.and_then(|v| v.try_into().ok()),
            resume_mic: wire.resume_mic.and_then(|v| v.try_into().ok()),
        };

        let Some(fabric) = self.fabrics.by_destination_id(&initiator_random, self.identity.node_id.value(), &destination_id) else {
            warn!("sigma1 destination id did not resolve to a joined fabric");
            return;
        };

        let responder_session_id = self.sessions.allocate_local_session_id();
        let (responder, sigma2) = CaseResponder::build_sigma2(
            &sigma1,
            responder_session_id,
            fabric.noc.clone(),
            fabric.icac.clone(),
            fabric.rcac.clone(),
            &self.identity.signing_key,
        );
        self.case_flows.lock().expect("lock poisoned").insert(
            key,
            CaseFlow {
                sigma1: sigma1.clone(),
                sigma2: sigma2.clone(),
                responder,
                fabric,
                responder_session_id,
                peer_session_id: sigma1.initiator_session_id,
            },
        );

        let wire_out = WireSigma2 {
            responder_random: sigma2.responder_random.to_vec(),
            responder_session_id: sigma2.responder_session_id,
            responder_eph_public_key: sigma2.responder_eph_public_key.to_vec(),
            responder_noc: sigma2.responder_noc.clone(),
            responder_icac: sigma2.responder_icac.clone(),
            responder_rcac: sigma2.responder_rcac.clone(),
            signature: sigma2.signature.to_bytes().to_vec(),
        };
        let bytes = serde_json::to_vec(&wire_out).expect("WireSigma2 always serializes");
        self.reply(key, secure_channel_opcode::CASE_SIGMA2, bytes).await;
    }

    async fn handle_sigma3(&self, key: ExchangeKey, payload: &[u8]) {
        let wire: WireSigma3 = match serde_json::from_slice(payload) {
            Ok(w) => w,
            Err(error) => {
                warn!(%error, "malformed Sigma3");
                return;
            }
        };
        let signature = match Signature::try_from(wire.signature.as_slice()) {
            Ok(s) => s,
            Err(_) => {
                warn!("malformed sigma3 signature");
                return;
            }
        };
        let sigma3 = Sigma3 { initiator_noc: wire.initiator_noc, initiator_icac: wire.initiator_icac, initiator_rcac: wire.initiator_rcac, signature };

        let Some(flow) = self.case_flows.lock().expect("lock poisoned").remove(&key) else {
            warn!("sigma3 received with no pending sigma1/sigma2 state");
            return;
        };

        let verifier = NoopCertificateVerifier;
        let ipk = flow.fabric.operational_identity_protection_key;
        match flow.responder.on_sigma3(&flow.sigma1, &flow.sigma2, &sigma3, &verifier, flow.fabric.fabric_id, &ipk) {
            Ok((keys, identity)) => {
                // `derive_case_keys` is computed identically by both ends of
                // the handshake (same transcript, same shared secret), so
                // `encrypt`/`decrypt` name *directions* ("to responder"/"to
                // initiator"), not "mine"/"theirs" — this side is the
                // responder, so its own encrypt/decrypt are the reverse of
                // the struct's literal field names.
                let session = Session::new(
                    SessionKind::Case,
                    flow.responder_session_id,
                    flow.peer_session_id,
                    Some(identity.node_id),
                    Some(flow.fabric.fabric_index),
                    keys.decrypt,
                    keys.encrypt,
                    keys.attestation_challenge,
                    1,
                    OUR_DEFAULTS,
                );
                self.sessions.insert(session);
                info!(local_session_id = flow.responder_session_id, peer_node_id = identity.node_id.value(), "CASE session established");

                let status = WireStatusReport { general_code: 0, protocol_id: u32::from(SECURE_CHANNEL), protocol_code: 0 };
                let bytes = serde_json::to_vec(&status).expect("WireStatusReport always serializes");
                self.reply(key, secure_channel_opcode::STATUS_REPORT, bytes).await;
            }
            Err(error) => warn!(%error, "case sigma3 verification failed"),
        }
    }
}

#[async_trait]
impl ProtocolHandler for SecureChannelHandler {
    async fn on_message(&self, key: ExchangeKey, opcode: u8, payload: &[u8]) {
        match opcode {
            secure_channel_opcode::PBKDF_PARAM_REQUEST => self.handle_pbkdf_param_request(key, payload).await,
            secure_channel_opcode::PASE_PAKE1 => self.handle_pake1(key, payload).await,
            secure_channel_opcode::PASE_PAKE3 => self.handle_pake3(key, payload).await,
            secure_channel_opcode::CASE_SIGMA1 => self.handle_sigma1(key, payload).await,
            secure_channel_opcode::CASE_SIGMA3 => self.handle_sigma3(key, payload).await,
            other => warn!(opcode = other, "secure channel: unexpected opcode"),
        }
    }

    async fn on_exchange_closed(&self, key: ExchangeKey) {
        self.pase_flows.lock().expect("lock poisoned").remove(&key);
        self.case_flows.lock().expect("lock poisoned").remove(&key);
        self.routing.remove(key);
    }
}

