//! The Bulk Data eXchange protocol handler (spec.md §4.J): a minimal OTA
//! image server wired to the exchange dispatch seam. Rides a secure
//! session exactly like [`crate::interaction::InteractionModelHandler`]
//! (BDX only ever runs after CASE/PASE has established one), but is its
//! own protocol id so it gets its own exchanges and its own
//! `ProtocolHandler` registration.
//!
//! This demo only drives the two roles that need no action on our part
//! beyond answering the peer's next message: `DrivenSending` (peer sent
//! `ReceiveInit`, then pulls blocks with `BlockQuery`/`BlockQueryWithSkip`)
//! to serve the demo image out, and `FollowingReceiving` (peer sent
//! `SendInit`, then pushes blocks unprompted) to accept one in. The peer's
//! proposed drive flags are overridden to force one of these two roles
//! rather than trusted verbatim, since the other two roles derivable from
//! them have no implementation here: `FollowingSending` (we'd have to push
//! blocks on our own initiative, outside of `on_message`) and
//! `DrivingReceiving` (we'd have to originate `BlockQuery`s).

use crate::frame;
use crate::session_routing::SessionRouting;
use async_trait::async_trait;
use matter_bdx::{derive_flow_role, BdxStatusCode, Transfer, TransferInitFlags};
use matter_codec::{NodeAddress, PacketHeader, PayloadHeader, SecurityFlags};
use matter_exchange::{ExchangeKey, ProtocolHandler};
use matter_session::SessionManager;
use matter_transport::{Transport, UdpTransport};
use matter_wire::protocol::{bdx_opcode, BDX};
use matter_wire::{
    WireBlock, WireBlockAck, WireBlockQuery, WireBlockQueryWithSkip, WireBlockStatusReport, WireReceiveAccept,
    WireReceiveInit, WireSendAccept, WireSendInit, WireTransferInitFlags,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Synthetic firmware image this node serves to anyone that opens a
/// `ReceiveInit` transfer against it. A real OTA provider reads this off
/// disk; this demo only needs bytes it can chunk and checksum-free reply
/// with, so a fixed repeating pattern stands in for one.
pub const DEMO_IMAGE_LEN: usize = 8192;

fn demo_image() -> Vec<u8> {
    (0..DEMO_IMAGE_LEN).map(|i| (i % 256) as u8).collect()
}

fn from_wire_flags(flags: WireTransferInitFlags) -> TransferInitFlags {
    TransferInitFlags { sender_drive: flags.sender_drive, receiver_drive: flags.receiver_drive, asynchronous: flags.asynchronous }
}

fn to_wire_flags(flags: TransferInitFlags) -> WireTransferInitFlags {
    WireTransferInitFlags { sender_drive: flags.sender_drive, receiver_drive: flags.receiver_drive, asynchronous: flags.asynchronous }
}

fn status_to_wire(status: BdxStatusCode) -> u8 {
    match status {
        BdxStatusCode::Overflow => 0,
        BdxStatusCode::LengthTooLarge => 1,
        BdxStatusCode::LengthRequired => 2,
        BdxStatusCode::BadMessageContents => 3,
        BdxStatusCode::UnexpectedBlockCounter => 4,
        BdxStatusCode::ResponderBusy => 5,
        BdxStatusCode::TransferFailedUnknownError => 6,
    }
}

/// One transfer bound to an exchange. `image` is only populated for a
/// transfer we're sending out (`DrivenSending`): it's the remaining bytes
/// to chunk, sliced down as blocks go out.
struct BdxSession {
    transfer: Transfer,
    image: Option<Arc<Vec<u8>>>,
    offset: usize,
}

pub struct BdxHandler {
    transport: Arc<UdpTransport>,
    routing: Arc<SessionRouting>,
    sessions: Arc<SessionManager>,
    local_node_id: u64,
    transport_max_block_size: u16,
    demo_image: Arc<Vec<u8>>,
    transfers: Mutex<HashMap<ExchangeKey, BdxSession>>,
}

impl BdxHandler {
    pub fn new(transport: Arc<UdpTransport>, routing: Arc<SessionRouting>, sessions: Arc<SessionManager>, local_node_id: u64, transport_max_block_size: u16) -> Self {
        BdxHandler {
            transport,
            routing,
            sessions,
            local_node_id,
            transport_max_block_size,
            demo_image: Arc::new(demo_image()),
            transfers: Mutex::new(HashMap::new()),
        }
    }

    async fn send(&self, key: ExchangeKey, opcode: u8, payload: Vec<u8>) {
        let Some(addr) = self.routing.get(key.session) else {
            warn!(exchange_id = key.exchange_id, "bdx: no known peer address for session");
            return;
        };
        let Some((message_id, encrypt_key, local_session_id, peer_node_id)) = self
            .sessions
            .with_session_mut(key.session, |s| (s.send_counter.next(), s.encrypt_key, s.local_session_id, s.peer_node_id))
        else {
            warn!("bdx: session gone before reply could be sent");
            return;
        };
        let peer_node_id = peer_node_id.map_or(0, matter_types::NodeId::value);
        let security_flags = SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false };
        let packet_header = PacketHeader {
            session_id: local_session_id,
            security_flags,
            message_id,
            source_node_id: Some(self.local_node_id),
            destination: Some(NodeAddress::Node(peer_node_id)),
        };
        let payload_header = PayloadHeader { exchange_id: key.exchange_id, protocol_id: BDX, vendor_id: None, opcode, is_initiator: key.is_initiator, requires_ack: false, acknowledged_message_id: None };
        let nonce = matter_crypto::unicast_nonce(security_flags.to_byte(), message_id, peer_node_id);
        match frame::encode_secure(&packet_header, &payload_header, &payload, &encrypt_key, &nonce) {
            Ok(bytes) => {
                if let Err(error) = self.transport.send(addr, &bytes).await {
                    warn!(%error, "bdx: failed to send reply");
                }
            }
            Err(error) => warn!(%error, "bdx: failed to encode reply"),
        }
    }

    async fn send_status(&self, key: ExchangeKey, status: BdxStatusCode) {
        let wire = WireBlockStatusReport { status: status_to_wire(status) };
        let bytes = serde_json::to_vec(&wire).expect("WireBlockStatusReport always serializes");
        self.send(key, bdx_opcode::BLOCK_STATUS_REPORT, bytes).await;
    }

    /// Peer wants to pull a file from us (spec.md §4.J: `ReceiveInit` ->
    /// `ReceiveAccept`). This demo only implements the `DrivenSending` role
    /// (answering `BlockQuery` pulls), so `receiver_drive` is forced to
    /// `true` regardless of what the peer proposed; `derive_flow_role`
    /// would otherwise hand back `FollowingSending` for a `false` proposal,
    /// a role nothing here drives.
    async fn handle_receive_init(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireReceiveInit>(payload) else {
            warn!("bdx: malformed ReceiveInit");
            return;
        };
        let mut flags = from_wire_flags(wire.flags);
        flags.receiver_drive = true;
        flags.sender_drive = false;
        let role = derive_flow_role(true, flags);
        debug_assert_eq!(role, matter_bdx::FlowRole::DrivenSending);
        let block_size = wire.max_block_size.min(self.transport_max_block_size);
        let file_length = self.demo_image.len() as u64;
        let mut transfer = Transfer::negotiate(role, flags, block_size, self.transport_max_block_size, Some(file_length))
            .expect("block_size was just clamped to transport_max_block_size");
        transfer.accept(block_size).expect("just-negotiated block size is within transport_max by construction");
        self.transfers.lock().expect("lock poisoned").insert(key, BdxSession { transfer, image: Some(Arc::clone(&self.demo_image)), offset: 0 });

        let wire_out = WireReceiveAccept { flags: to_wire_flags(flags), block_size, file_length: Some(file_length) };
        let bytes = serde_json::to_vec(&wire_out).expect("WireReceiveAccept always serializes");
        self.send(key, bdx_opcode::RECEIVE_ACCEPT, bytes).await;
    }

    /// Peer wants to push a file to us (`SendInit` -> `SendAccept`). This
    /// demo only implements the `FollowingReceiving` role (passively
    /// acking what arrives), so `receiver_drive` is forced to `false`
    /// regardless of what the peer proposed; a `true` proposal would
    /// otherwise negotiate `DrivingReceiving`, a role nothing here drives.
    async fn handle_send_init(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireSendInit>(payload) else {
            warn!("bdx: malformed SendInit");
            return;
        };
        let mut flags = from_wire_flags(wire.flags);
        flags.receiver_drive = false;
        flags.sender_drive = true;
        let role = derive_flow_role(false, flags);
        debug_assert_eq!(role, matter_bdx::FlowRole::FollowingReceiving);
        let block_size = wire.max_block_size.min(self.transport_max_block_size);
        let mut transfer = Transfer::negotiate(role, flags, block_size, self.transport_max_block_size, wire.file_length)
            .expect("block_size was just clamped to transport_max_block_size");
        transfer.accept(block_size).expect("just-negotiated block size is within transport_max by construction");
        self.transfers.lock().expect("lock poisoned").insert(key, BdxSession { transfer, image: None, offset: 0 });

        let wire_out = WireSendAccept { flags: to_wire_flags(flags), block_size };
        let bytes = serde_json::to_vec(&wire_out).expect("WireSendAccept always serializes");
        self.send(key, bdx_opcode::SEND_ACCEPT, bytes).await;
    }

    /// Answer a `BlockQuery`/`BlockQueryWithSkip` by chunking the next
    /// slice of `session.image` out (spec.md §4.J: driven-sending side).
    async fn handle_block_query(&self, key: ExchangeKey, counter: u32, bytes_to_skip: u64) {
        let outcome = {
            let mut transfers = self.transfers.lock().expect("lock poisoned");
            let Some(session) = transfers.get_mut(&key) else {
                warn!("bdx: BlockQuery for unknown transfer");
                return;
            };
            let Some(image) = session.image.clone() else {
                warn!("bdx: BlockQuery on a transfer we're receiving, not sending");
                return;
            };
            session.offset = session.offset.saturating_add(bytes_to_skip as usize).min(image.len());
            let block_size = session.transfer.block_size() as usize;
            let remaining = &image[session.offset..];
            let take = remaining.len().min(block_size);
            let chunk = remaining[..take].to_vec();
            let eof = session.offset + take >= image.len();
            match session.transfer.on_block_sent(counter, take, eof) {
                Ok(_) => {
                    session.offset += take;
                    Ok((chunk, eof))
                }
                Err(error) => Err(error),
            }
        };

        match outcome {
            Ok((chunk, eof)) => {
                let opcode = if eof { bdx_opcode::BLOCK_EOF } else { bdx_opcode::BLOCK };
                let wire = WireBlock { counter, data: chunk };
                let bytes = serde_json::to_vec(&wire).expect("WireBlock always serializes");
                self.send(key, opcode, bytes).await;
                if eof {
                    self.transfers.lock().expect("lock poisoned").remove(&key);
                }
            }
            Err(error) => {
                warn!(%error, "bdx: BlockQuery counter mismatch");
                self.send_status(key, BdxStatusCode::UnexpectedBlockCounter).await;
                self.abort(key).await;
            }
        }
    }

    /// Accept a `Block`/`BlockEof` pushed to us (spec.md §4.J:
    /// following-receiving side) and ack it.
    async fn handle_block(&self, key: ExchangeKey, payload: &[u8], eof: bool) {
        let Ok(wire) = serde_json::from_slice::<WireBlock>(payload) else {
            warn!("bdx: malformed Block");
            return;
        };
        let result = {
            let mut transfers = self.transfers.lock().expect("lock poisoned");
            let Some(session) = transfers.get_mut(&key) else {
                warn!("bdx: Block for unknown transfer");
                return;
            };
            session.transfer.on_block_received(wire.counter, wire.data.len(), eof)
        };

        match result {
            Ok(is_eof) => {
                let opcode = if is_eof { bdx_opcode::BLOCK_ACK_EOF } else { bdx_opcode::BLOCK_ACK };
                let wire_out = WireBlockAck { counter: wire.counter };
                let bytes = serde_json::to_vec(&wire_out).expect("WireBlockAck always serializes");
                self.send(key, opcode, bytes).await;
                if is_eof {
                    self.transfers.lock().expect("lock poisoned").remove(&key);
                }
            }
            Err(error) => {
                warn!(%error, "bdx: Block rejected");
                self.send_status(key, BdxStatusCode::UnexpectedBlockCounter).await;
                self.abort(key).await;
            }
        }
    }

    async fn handle_block_status_report(&self, key: ExchangeKey, payload: &[u8]) {
        if serde_json::from_slice::<WireBlockStatusReport>(payload).is_err() {
            warn!("bdx: malformed BlockStatusReport");
        }
        self.abort(key).await;
    }

    async fn abort(&self, key: ExchangeKey) {
        if let Some(mut session) = self.transfers.lock().expect("lock poisoned").remove(&key) {
            session.transfer.abort(BdxStatusCode::TransferFailedUnknownError);
        }
    }
}

#[async_trait]
impl ProtocolHandler for BdxHandler {
    async fn on_message(&self, key: ExchangeKey, opcode: u8, payload: &[u8]) {
        match opcode {
            bdx_opcode::RECEIVE_INIT => self.handle_receive_init(key, payload).await,
            bdx_opcode::SEND_INIT => self.handle_send_init(key, payload).await,
            bdx_opcode::BLOCK_QUERY => match serde_json::from_slice::<WireBlockQuery>(payload) {
                Ok(wire) => self.handle_block_query(key, wire.counter, 0).await,
                Err(error) => warn!(%error, "bdx: malformed BlockQuery"),
            },
            bdx_opcode::BLOCK_QUERY_WITH_SKIP => match serde_json::from_slice::<WireBlockQueryWithSkip>(payload) {
                Ok(wire) => self.handle_block_query(key, wire.counter, wire.bytes_to_skip).await,
                Err(error) => warn!(%error, "bdx: malformed BlockQueryWithSkip"),
            },
            bdx_opcode::BLOCK => self.handle_block(key, payload, false).await,
            bdx_opcode::BLOCK_EOF => self.handle_block(key, payload, true).await,
            bdx_opcode::BLOCK_ACK | bdx_opcode::BLOCK_ACK_EOF => {
                // Nothing to do: this demo only drives the roles where the
                // peer pulls or pushes and we only ever react, never push
                // unprompted, so an ack of our own send needs no follow-up.
            }
            bdx_opcode::BLOCK_STATUS_REPORT => self.handle_block_status_report(key, payload).await,
            other => warn!(opcode = other, "bdx: unexpected opcode"),
        }
    }

    async fn on_exchange_closed(&self, key: ExchangeKey) {
        self.abort(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_session::{Session, SessionKind, OUR_DEFAULTS};
    use matter_transport::UdpTransport;
    use std::time::Duration;

    const SESSION_KEY: [u8; 16] = [11u8; 16];

    async fn setup() -> (BdxHandler, tokio::net::UdpSocket, ExchangeKey) {
        let (node_transport, _node_rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer_socket.local_addr().unwrap();

        let sessions = Arc::new(SessionManager::new());
        let session = sessions.insert(Session::new(
            SessionKind::Case,
            10,
            20,
            Some(matter_types::NodeId(99)),
            Some(matter_types::FabricIndex::new(1).unwrap()),
            SESSION_KEY,
            SESSION_KEY,
            [0u8; 32],
            1,
            OUR_DEFAULTS,
        ));

        let routing = Arc::new(SessionRouting::new());
        routing.record(session, peer_addr);

        let handler = BdxHandler::new(Arc::new(node_transport), routing, sessions, 1, 1024);
        let key = ExchangeKey { session, exchange_id: 1, is_initiator: true };
        (handler, peer_socket, key)
    }

    fn decode_reply(bytes: &[u8]) -> (PayloadHeader, Vec<u8>) {
        let (packet_header, _) = PacketHeader::decode(bytes).unwrap();
        let destination = match packet_header.destination {
            Some(NodeAddress::Node(id)) => id,
            other => panic!("expected a node destination, got {other:?}"),
        };
        let nonce = matter_crypto::unicast_nonce(packet_header.security_flags.to_byte(), packet_header.message_id, destination);
        let (_, payload_header, payload) = frame::decode_secure(bytes, &SESSION_KEY, &nonce).unwrap();
        (payload_header, payload)
    }

    async fn recv_reply(socket: &tokio::net::UdpSocket) -> (PayloadHeader, Vec<u8>) {
        let mut buf = [0u8; 9000];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await.expect("reply timed out").unwrap();
        decode_reply(&buf[..len])
    }

    fn flags() -> WireTransferInitFlags {
        WireTransferInitFlags { sender_drive: false, receiver_drive: true, asynchronous: false }
    }

    #[tokio::test]
    async fn receive_init_is_accepted_with_the_demo_image_length() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireReceiveInit { flags: flags(), file_designator: "demo.ota".into(), max_block_size: 256 };
        handler.on_message(key, bdx_opcode::RECEIVE_INIT, &serde_json::to_vec(&wire).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, bdx_opcode::RECEIVE_ACCEPT);
        let accept: WireReceiveAccept = serde_json::from_slice(&payload).unwrap();
        assert_eq!(accept.block_size, 256);
        assert_eq!(accept.file_length, Some(DEMO_IMAGE_LEN as u64));
    }

    #[tokio::test]
    async fn block_query_walk_serves_the_whole_image_then_ends_the_transfer() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireReceiveInit { flags: flags(), file_designator: "demo.ota".into(), max_block_size: 1024 };
        handler.on_message(key, bdx_opcode::RECEIVE_INIT, &serde_json::to_vec(&wire).unwrap()).await;
        recv_reply(&peer_socket).await;

        let mut received = Vec::new();
        let mut counter = 0u32;
        loop {
            let query = WireBlockQuery { counter };
            handler.on_message(key, bdx_opcode::BLOCK_QUERY, &serde_json::to_vec(&query).unwrap()).await;
            let (payload_header, payload) = recv_reply(&peer_socket).await;
            let block: WireBlock = serde_json::from_slice(&payload).unwrap();
            received.extend_from_slice(&block.data);
            counter += 1;
            if payload_header.opcode == bdx_opcode::BLOCK_EOF {
                break;
            }
            assert_eq!(payload_header.opcode, bdx_opcode::BLOCK);
        }
        assert_eq!(received, demo_image());
        assert!(handler.transfers.lock().unwrap().is_empty(), "transfer must be cleared once the last block is sent");
    }

    #[tokio::test]
    async fn send_init_then_block_eof_is_acked_and_clears_the_transfer() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireSendInit { flags: WireTransferInitFlags { sender_drive: true, receiver_drive: false, asynchronous: false }, file_designator: "demo.ota".into(), max_block_size: 256, file_length: Some(4) };
        handler.on_message(key, bdx_opcode::SEND_INIT, &serde_json::to_vec(&wire).unwrap()).await;
        recv_reply(&peer_socket).await; // SendAccept

        let block = WireBlock { counter: 0, data: vec![1, 2, 3, 4] };
        handler.on_message(key, bdx_opcode::BLOCK_EOF, &serde_json::to_vec(&block).unwrap()).await;
        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, bdx_opcode::BLOCK_ACK_EOF);
        let ack: WireBlockAck = serde_json::from_slice(&payload).unwrap();
        assert_eq!(ack.counter, 0);
        assert!(handler.transfers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_block_counter_aborts_the_transfer() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireSendInit { flags: WireTransferInitFlags { sender_drive: true, receiver_drive: false, asynchronous: false }, file_designator: "demo.ota".into(), max_block_size: 256, file_length: Some(4) };
        handler.on_message(key, bdx_opcode::SEND_INIT, &serde_json::to_vec(&wire).unwrap()).await;
        recv_reply(&peer_socket).await;

        let block = WireBlock { counter: 5, data: vec![1] };
        handler.on_message(key, bdx_opcode::BLOCK, &serde_json::to_vec(&block).unwrap()).await;
        let (payload_header, _) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, bdx_opcode::BLOCK_STATUS_REPORT);
        assert!(handler.transfers.lock().unwrap().is_empty());
    }
}
