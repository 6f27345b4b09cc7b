//! A single secure session this commissioner holds open against one node —
//! the commissioner-side counterpart of the bookkeeping
//! `matter_session::SessionManager` does for `services/node`. This binary
//! only ever talks to one peer at a time, so a single struct's worth of
//! fields (rather than a generational arena keyed by session handle) is
//! all the routing state there is to keep.
//!
//! The wire `session_id` used by both ends for the lifetime of a session
//! is always the value the *responder* allocated during the handshake
//! (`matter_session::manager::SessionManager::allocate_local_session_id`
//! on the node side) — this link stores exactly that value and echoes it
//! back on every frame it sends, the same way `services/node`'s
//! `interaction.rs::send()` does with `s.local_session_id`.

use crate::error::ControllerError;
use crate::frame;
use matter_codec::{NodeAddress, PacketHeader, PayloadHeader, SecurityFlags};
use matter_transport::{Transport, UdpTransport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Secure-channel traffic always rides session id 0 and is addressed by
/// UDP socket address rather than session handle (mirrors
/// `services/node`'s `secure_channel::SecureChannelHandler::reply`).
pub const UNSECURED_SESSION_ID: u16 = 0;

pub struct SecureLink {
    transport: Arc<UdpTransport>,
    peer_addr: SocketAddr,
    our_node_id: u64,
    pub peer_node_id: u64,
    pub session_id: u16,
    encrypt_key: [u8; 16],
    decrypt_key: [u8; 16],
    next_message_id: AtomicU32,
}

impl SecureLink {
    pub fn new(
        transport: Arc<UdpTransport>,
        peer_addr: SocketAddr,
        our_node_id: u64,
        peer_node_id: u64,
        session_id: u16,
        encrypt_key: [u8; 16],
        decrypt_key: [u8; 16],
    ) -> Self {
        SecureLink { transport, peer_addr, our_node_id, peer_node_id, session_id, encrypt_key, decrypt_key, next_message_id: AtomicU32::new(1) }
    }

    fn allocate_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send(&self, exchange_id: u16, protocol_id: u16, opcode: u8, is_initiator: bool, payload: Vec<u8>) -> Result<(), ControllerError> {
        let message_id = self.allocate_message_id();
        let security_flags = SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false };
        let packet_header = PacketHeader {
            session_id: self.session_id,
            security_flags,
            message_id,
            source_node_id: Some(self.our_node_id),
            destination: Some(NodeAddress::Node(self.peer_node_id)),
        };
        let payload_header = PayloadHeader {
            exchange_id,
            protocol_id,
            vendor_id: None,
            opcode,
            is_initiator,
            requires_ack: false,
            acknowledged_message_id: None,
        };
        let nonce = matter_crypto::unicast_nonce(security_flags.to_byte(), message_id, self.peer_node_id);
        let bytes = frame::encode_secure(&packet_header, &payload_header, &payload, &self.encrypt_key, &nonce)?;
        self.transport.send(self.peer_addr, &bytes).await?;
        Ok(())
    }

    /// Decodes one inbound secure datagram addressed to this session. The
    /// destination node id read off the cleartext header (not a fixed
    /// assumption) feeds the nonce, exactly as `services/node`'s
    /// `handle_secure` does — self-consistent in both directions without
    /// special-casing the PASE-vs-CASE destination value.
    pub fn decode(&self, buf: &[u8]) -> Result<(PayloadHeader, Vec<u8>), ControllerError> {
        let (packet_header, _) = PacketHeader::decode(buf)?;
        let destination_node_id = match packet_header.destination {
            Some(NodeAddress::Node(node_id)) => node_id,
            _ => self.our_node_id,
        };
        let nonce = matter_crypto::unicast_nonce(packet_header.security_flags.to_byte(), packet_header.message_id, destination_node_id);
        let (_header, payload_header, payload) = frame::decode_secure(buf, &self.decrypt_key, &nonce)?;
        Ok((payload_header, payload))
    }
}

/// One-shot unsecured request/response helper for the PASE/CASE handshake,
/// shared by `pase_client` and `case_client`: send a single unsecured
/// frame addressed to `peer_addr`, then wait for the next datagram that
/// decodes to the expected opcode on the expected exchange.
pub async fn send_unsecured(
    transport: &UdpTransport,
    peer_addr: SocketAddr,
    our_node_id: u64,
    exchange_id: u16,
    opcode: u8,
    message_id: u32,
    payload: Vec<u8>,
) -> Result<(), ControllerError> {
    let packet_header = PacketHeader {
        session_id: UNSECURED_SESSION_ID,
        security_flags: SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false },
        message_id,
        source_node_id: Some(our_node_id),
        destination: None,
    };
    let payload_header = PayloadHeader {
        exchange_id,
        protocol_id: matter_wire::protocol::SECURE_CHANNEL,
        vendor_id: None,
        opcode,
        is_initiator: true,
        requires_ack: false,
        acknowledged_message_id: None,
    };
    let bytes = frame::encode_unsecured(packet_header, payload_header, payload)?;
    transport.send(peer_addr, &bytes).await?;
    Ok(())
}

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Waits for the next inbound datagram from `peer_addr`, decodes it as an
/// unsecured `Packet`, and returns its payload header + payload.
pub async fn recv_unsecured(
    inbound: &mut mpsc::Receiver<matter_transport::InboundMessage>,
    peer_addr: SocketAddr,
) -> Result<(PayloadHeader, Vec<u8>), ControllerError> {
    loop {
        let message = timeout(REPLY_TIMEOUT, inbound.recv()).await.map_err(|_| ControllerError::Timeout)?.ok_or(ControllerError::TransportClosed)?;
        if message.peer != peer_addr {
            continue;
        }
        let packet = frame::decode_unsecured(&message.data)?;
        return Ok((packet.payload_header, packet.payload));
    }
}

impl SecureLink {
    /// Waits for the next inbound secure datagram from this session's peer
    /// and decodes it under this link's keys.
    pub async fn recv(&self, inbound: &mut mpsc::Receiver<matter_transport::InboundMessage>) -> Result<(PayloadHeader, Vec<u8>), ControllerError> {
        loop {
            let message = timeout(REPLY_TIMEOUT, inbound.recv()).await.map_err(|_| ControllerError::Timeout)?.ok_or(ControllerError::TransportClosed)?;
            if message.peer != self.peer_addr {
                continue;
            }
            return self.decode(&message.data);
        }
    }
}
