//! The demo Matter node binary (spec.md §1 scope): a single device
//! playing PASE/CASE responder, holding one fabric's worth of endpoints,
//! answering Read/Write/Invoke and driving its own subscriptions.
//!
//! [`run`] owns construction and the datagram/timer event loop; everything
//! it wires together lives in the other modules here, mirroring how
//! `services/forwarder`'s `run` ties its storage/transport/protocol pieces
//! together behind one entry point.

pub mod bdx;
pub mod commissioning;
pub mod config;
pub mod endpoint_demo;
pub mod error;
pub mod frame;
pub mod identity;
pub mod interaction;
pub mod secure_channel;
pub mod session_routing;

use crate::bdx::BdxHandler;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::identity::NodeIdentity;
use crate::interaction::InteractionModelHandler;
use crate::secure_channel::{PeerRoutingTable, SecureChannelHandler};
use crate::session_routing::SessionRouting;
use matter_codec::{NodeAddress, PacketHeader};
use matter_exchange::{ExchangeKey, ExchangeManager};
use matter_fabric::store::{FabricStore, MemoryFabricStore, SqliteFabricStore};
use matter_fabric::{FabricEvent, FabricRegistry};
use matter_session::{Session, SessionKind, SessionManager, OUR_DEFAULTS};
use matter_transport::{InboundMessage, Transport, UdpTransport};
use matter_types::NodeId;
use matter_wire::protocol::{BDX, INTERACTION_MODEL, SECURE_CHANNEL};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// spec.md §4.C's base retransmit interval before backoff; shared by every
/// exchange this node opens or accepts.
const MRP_BASE_INTERVAL: Duration = Duration::from_millis(500);
/// How often the event loop checks for due retransmits, standalone acks,
/// and subscription reports — the single timer wheel's granularity.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Everything `run`'s event loop needs a handle to, split out of `run`
/// itself so the inbound-dispatch and tick logic can each take `&self`
/// instead of a pile of loose parameters.
struct Node {
    transport: Arc<UdpTransport>,
    sessions: Arc<SessionManager>,
    exchanges: Arc<ExchangeManager>,
    peer_routing: Arc<PeerRoutingTable>,
    session_routing: Arc<SessionRouting>,
    unsecured_session: matter_types::Handle<Session>,
    closing: CancellationToken,
    interaction: Arc<InteractionModelHandler>,
    local_node_id: u64,
}

impl Node {
    async fn handle_inbound(&self, message: InboundMessage) {
        let (packet_header, _) = match PacketHeader::decode(&message.data) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, peer = %message.peer, "dropping undecodable datagram");
                return;
            }
        };

        if packet_header.session_id == 0 {
            self.handle_unsecured(message).await;
        } else {
            self.handle_secure(packet_header, message).await;
        }
    }

    async fn handle_unsecured(&self, message: InboundMessage) {
        let packet = match frame::decode_unsecured(&message.data) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, peer = %message.peer, "malformed unsecured frame");
                return;
            }
        };
        let key = match self.exchanges.dispatch_inbound(
            self.unsecured_session,
            packet.payload_header.exchange_id,
            packet.payload_header.is_initiator,
            packet.payload_header.protocol_id,
            MRP_BASE_INTERVAL,
            &self.closing,
        ) {
            Ok(key) => key,
            Err(error) => {
                warn!(%error, peer = %message.peer, "rejecting unsecured frame");
                return;
            }
        };
        self.peer_routing.record(key, message.peer);
        self.note_inbound_ack(key, packet.payload_header.acknowledged_message_id);

        let Some(handler) = self.exchanges.handler_for(packet.payload_header.protocol_id) else {
            warn!(protocol_id = packet.payload_header.protocol_id, "no handler for unsecured protocol");
            return;
        };
        handler.on_message(key, packet.payload_header.opcode, &packet.payload).await;
    }

    /// A peer's `acknowledgedMessageId` resolves that message in this
    /// exchange's `MrpState` (spec.md §4.C) and, if the exchange backs a
    /// live subscription, proves the peer is still there (spec.md §4.G.5).
    fn note_inbound_ack(&self, key: ExchangeKey, acknowledged_message_id: Option<u32>) {
        let Some(message_id) = acknowledged_message_id else { return };
        self.exchanges.with_mrp(key, |mrp| mrp.on_ack(message_id));
        self.interaction.note_ack(key);
    }

    async fn handle_secure(&self, packet_header: PacketHeader, message: InboundMessage) {
        let Ok(session) = self.sessions.by_local_session_id(packet_header.session_id) else {
            warn!(local_session_id = packet_header.session_id, peer = %message.peer, "secure frame for unknown session");
            return;
        };
        let Some(decrypt_key) = self.sessions.with_session(session, |s| s.decrypt_key) else {
            return;
        };
        let destination_node_id = match packet_header.destination {
            Some(NodeAddress::Node(node_id)) => node_id,
            _ => self.local_node_id,
        };
        let nonce = matter_crypto::unicast_nonce(packet_header.security_flags.to_byte(), packet_header.message_id, destination_node_id);
        let (_, payload_header, payload) = match frame::decode_secure(&message.data, &decrypt_key, &nonce) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, peer = %message.peer, "secure frame failed to open");
                return;
            }
        };
        self.session_routing.record(session, message.peer);

        let key = match self.exchanges.dispatch_inbound(
            session,
            payload_header.exchange_id,
            payload_header.is_initiator,
            payload_header.protocol_id,
            MRP_BASE_INTERVAL,
            &self.closing,
        ) {
            Ok(key) => key,
            Err(error) => {
                warn!(%error, peer = %message.peer, "rejecting secure frame");
                return;
            }
        };
        self.note_inbound_ack(key, payload_header.acknowledged_message_id);

        let Some(handler) = self.exchanges.handler_for(payload_header.protocol_id) else {
            warn!(protocol_id = payload_header.protocol_id, "no handler for secure protocol");
            return;
        };
        handler.on_message(key, payload_header.opcode, &payload).await;
    }

    /// One sweep of the single timer wheel (spec.md §4.C, §4.H): flush due
    /// MRP retransmits and standalone acks, then service due subscriptions.
    /// Only sends that actually asked for an ack (subscription reports, via
    /// `InteractionModelHandler::send`) are ever registered with `MrpState`,
    /// so this is a no-op until a subscription exists.
    async fn tick(&self) {
        let now = std::time::Instant::now();
        for (key, due) in self.exchanges.poll_retransmits(now, rand::random::<f64>()) {
            let Some(addr) = self.session_routing.get(key.session) else { continue };
            for (_message_id, result) in due {
                match result {
                    Ok(bytes) => {
                        if let Err(error) = self.transport.send(addr, &bytes).await {
                            warn!(%error, "failed to retransmit");
                        }
                    }
                    Err(error) => warn!(%error, "exchange exhausted its retransmit budget"),
                }
            }
        }
        let _standalone_acks_due = self.exchanges.poll_standalone_acks(now);

        self.interaction.poll_failsafe_expiry(now);
        self.interaction.service_subscriptions().await;
    }
}

/// Build the fabric store per `config.storage`: SQLite for a real path,
/// in-memory only when explicitly pointed at `:memory:` (handy for demos
/// and tests that don't want a file on disk).
fn open_fabric_store(config: &config::StorageConfig) -> Result<Arc<dyn FabricStore>, NodeError> {
    if config.sqlite_path == ":memory:" {
        return Ok(Arc::new(MemoryFabricStore::new()));
    }
    let path = Path::new(&config.sqlite_path);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = SqliteFabricStore::open(path)?;
    Ok(Arc::new(store))
}

/// Wire every layer together and run until `shutdown` fires or a fatal
/// transport error occurs.
pub async fn run(config: NodeConfig, shutdown: CancellationToken) -> Result<(), NodeError> {
    let bind_addr: SocketAddr = config.listen.udp_bind.parse().map_err(|_| NodeError::MalformedMessage(format!("invalid listen address '{}'", config.listen.udp_bind)))?;
    let (transport, mut inbound) = UdpTransport::bind(bind_addr).await?;
    let transport = Arc::new(transport);
    info!(addr = %bind_addr, "node listening");

    let sessions = Arc::new(SessionManager::new());
    let unsecured_session = sessions.insert(Session::new(SessionKind::Unsecure, 0, 0, None, None, [0; 16], [0; 16], [0; 32], 1, OUR_DEFAULTS));

    let exchanges = Arc::new(ExchangeManager::new());
    let peer_routing = Arc::new(PeerRoutingTable::new());
    let session_routing = Arc::new(SessionRouting::new());

    let fabric_store = open_fabric_store(&config.storage)?;
    let fabrics = Arc::new(FabricRegistry::load(fabric_store)?);

    let local_node_id = NodeId(config.fabric.node_id);
    let identity = Arc::new(NodeIdentity::new(local_node_id));

    // On a restart after commissioning, the joined fabric's admin node is
    // already known and the light endpoint's ACL should admit it straight
    // away rather than waiting for a fresh `AddNOC`.
    let admin_node_id = fabrics.all().first().map(|f| f.node_id);
    let graph = endpoint_demo::build(admin_node_id);
    let onoff_handler: Arc<dyn matter_interaction::CommandHandler> = Arc::new(endpoint_demo::OnOffCommandHandler);

    let secure_channel_handler = Arc::new(SecureChannelHandler::new(
        Arc::clone(&transport),
        Arc::clone(&peer_routing),
        Arc::clone(&sessions),
        Arc::clone(&fabrics),
        Arc::clone(&identity),
        unsecured_session,
        config.commissioning.passcode,
    ));
    exchanges.register_protocol(SECURE_CHANNEL, secure_channel_handler);

    let interaction_handler = Arc::new(InteractionModelHandler::new(
        Arc::clone(&transport),
        Arc::clone(&session_routing),
        Arc::clone(&sessions),
        Arc::clone(&exchanges),
        graph,
        onoff_handler,
        Arc::clone(&fabrics),
        Arc::clone(&identity),
        config.interaction.max_chunk_bytes,
        config.interaction.max_paths_per_invoke as usize,
        local_node_id.value(),
        Arc::new(endpoint_demo::schema()),
    ));
    exchanges.register_protocol(INTERACTION_MODEL, Arc::clone(&interaction_handler) as Arc<dyn matter_exchange::ProtocolHandler>);

    let bdx_handler = Arc::new(BdxHandler::new(Arc::clone(&transport), Arc::clone(&session_routing), Arc::clone(&sessions), local_node_id.value(), config.bdx.transport_max_block_size));
    exchanges.register_protocol(BDX, bdx_handler as Arc<dyn matter_exchange::ProtocolHandler>);

    let node = Node {
        transport,
        sessions: Arc::clone(&sessions),
        exchanges,
        peer_routing,
        session_routing,
        unsecured_session,
        closing: shutdown.clone(),
        interaction: interaction_handler,
        local_node_id: local_node_id.value(),
    };

    let mut destroyed = sessions.subscribe_destroyed();
    let mut fabric_events = fabrics.subscribe();
    let mut tick = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            message = inbound.recv() => {
                match message {
                    Some(message) => node.handle_inbound(message).await,
                    None => {
                        warn!("udp transport read loop exited");
                        break;
                    }
                }
            }
            _ = tick.tick() => node.tick().await,
            destroyed_event = destroyed.recv() => {
                if let Ok(event) = destroyed_event {
                    node.session_routing.remove(event.handle);
                    node.exchanges.close_all_for_session(event.handle);
                }
            }
            // spec.md §4.E: a fabric removal cascades to every session bound
            // to it; `SessionManager::destroy` (called inside
            // `destroy_all_for_fabric`) re-fires `destroyed`, so the branch
            // above still does the exchange-level cleanup for each one.
            fabric_event = fabric_events.recv() => {
                if let Ok(FabricEvent::Deleted(fabric_index)) = fabric_event {
                    node.sessions.destroy_all_for_fabric(fabric_index);
                }
            }
        }
    }

    node.transport.close().await?;
    Ok(())
}
