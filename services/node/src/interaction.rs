//! The Interaction Model protocol handler (spec.md §4.G): wires
//! `matter_interaction`'s pure Read/Write/Invoke/Subscribe functions to the
//! exchange dispatch seam, translating between `matter-wire`'s JSON DTOs
//! and the crate's typed request/response shapes.
//!
//! Mirrors [`crate::secure_channel::SecureChannelHandler`]'s shape (a
//! `ProtocolHandler` holding `Arc`s to the shared node state) but replies
//! over a *secure* frame (`frame::encode_secure`) addressed by session
//! rather than by raw peer address, since every Interaction Model exchange
//! rides a PASE/CASE session by the time it's in use.

use crate::commissioning;
use crate::frame;
use crate::identity::NodeIdentity;
use crate::session_routing::SessionRouting;
use async_trait::async_trait;
use matter_codec::{NodeAddress, PacketHeader, PayloadHeader, SecurityFlags};
use matter_exchange::{ExchangeKey, ExchangeManager, ProtocolHandler};
use matter_fabric::FabricRegistry;
use matter_failsafe::{ArrivedOver, FailsafeContext};
use matter_interaction::{
    read, write, AttributeDataIn, CommandDataIn, CommandHandler, DataVersionFilter, EndpointGraph, ImStatus,
    InvokeResponse, ListOp, ReadRequest, ReportChunk, SubscribeRequest, TimedCheck, TimedContext,
    TimedInteractionGuard,
};
use matter_session::{SessionKind, SessionManager};
use matter_subscription::{ServerSubscription, SubscriptionManager};
use matter_transport::{Transport, UdpTransport};
use matter_types::{
    AttributeId, AttributePath, ClusterId, ConcreteAttributePath, ConcreteClusterPath, ConcreteCommandPath,
    EndpointId, EventId, EventPath, Handle, PeerAddress, Schema, VendorId,
};
use serde::Deserialize;
use matter_wire::protocol::{im_opcode, INTERACTION_MODEL};
use matter_wire::{
    WireAttributePath, WireDataVersionFilter, WireEventPath, WireInvokeRequest, WireInvokeResponse,
    WireInvokeResponseEnvelope, WireListOp, WireReadRequest, WireReportChunk, WireReportData, WireStatusResponse,
    WireSubscribeRequest, WireSubscribeResponse, WireTimedRequest, WireWriteRequest, WireWriteResponse,
    WireWriteStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

fn to_attribute_path(wire: &WireAttributePath) -> AttributePath {
    AttributePath {
        endpoint: wire.endpoint.map(EndpointId),
        cluster: wire.cluster.map(ClusterId),
        attribute: wire.attribute.map(AttributeId),
        list_index: wire.list_index,
    }
}

fn to_event_path(wire: &WireEventPath) -> EventPath {
    EventPath { endpoint: wire.endpoint.map(EndpointId), cluster: wire.cluster.map(ClusterId), event: wire.event.map(EventId), event_min: wire.event_min }
}

fn to_data_version_filter(wire: &WireDataVersionFilter) -> DataVersionFilter {
    DataVersionFilter {
        cluster_path: ConcreteClusterPath { endpoint: EndpointId(wire.endpoint), cluster: ClusterId(wire.cluster) },
        data_version: wire.data_version,
    }
}

fn chunk_to_wire(chunk: &ReportChunk) -> WireReportChunk {
    match chunk {
        ReportChunk::Attribute { path, data_version, value } => {
            WireReportChunk::Attribute { endpoint: path.endpoint.value(), cluster: path.cluster.value(), attribute: path.attribute.value(), data_version: *data_version, value: value.clone() }
        }
        ReportChunk::AttributeStatus { path, status } => {
            WireReportChunk::AttributeStatus { endpoint: path.endpoint.value(), cluster: path.cluster.value(), attribute: path.attribute.value(), status: *status as u8 }
        }
        ReportChunk::Event { path, event_number, value } => {
            WireReportChunk::Event { endpoint: path.endpoint.value(), cluster: path.cluster.value(), event: path.event.value(), event_number: *event_number, value: value.clone() }
        }
    }
}

fn list_op_from_wire(op: WireListOp) -> ListOp {
    match op {
        WireListOp::Replace => ListOp::Replace,
        WireListOp::Append => ListOp::Append,
        WireListOp::Remove => ListOp::Remove,
    }
}

fn invoke_response_to_wire(response: &InvokeResponse) -> WireInvokeResponse {
    match response {
        InvokeResponse::Value { path, value } => {
            WireInvokeResponse::Value { endpoint: path.endpoint.value(), cluster: path.cluster.value(), command: path.command.value(), value: value.clone() }
        }
        InvokeResponse::StatusSuccess { path } => {
            WireInvokeResponse::StatusSuccess { endpoint: path.endpoint.value(), cluster: path.cluster.value(), command: path.command.value() }
        }
        InvokeResponse::StatusError { path, status, cluster_status } => WireInvokeResponse::StatusError {
            endpoint: path.endpoint.value(),
            cluster: path.cluster.value(),
            command: path.command.value(),
            status: *status as u8,
            cluster_status: *cluster_status,
        },
    }
}

/// Everything the handler needs to know about the peer a given exchange's
/// session belongs to: who they are (for ACL checks), where replies go, and
/// how the request arrived (for the commissioning commands' PASE/CASE
/// checks).
struct PeerContext {
    subject: Option<matter_types::NodeId>,
    peer: PeerAddress,
    fabric_index: Option<matter_types::FabricIndex>,
    arrived_over: ArrivedOver,
}

#[derive(Deserialize)]
struct ArmFailSafeFields {
    expiry_length_seconds: u16,
}

#[derive(Deserialize)]
struct AddNocFields {
    fabric_id: u64,
    admin_vendor_id: u16,
    node_id: u64,
    ipk_value: [u8; 16],
}

pub struct InteractionModelHandler {
    transport: Arc<UdpTransport>,
    routing: Arc<SessionRouting>,
    sessions: Arc<SessionManager>,
    exchanges: Arc<ExchangeManager>,
    graph: Mutex<EndpointGraph>,
    onoff_handler: Arc<dyn CommandHandler>,
    failsafe: Mutex<FailsafeContext>,
    fabrics: Arc<FabricRegistry>,
    identity: Arc<NodeIdentity>,
    subscriptions: Mutex<SubscriptionManager>,
    /// Which exchange each live subscription rides its ongoing reports on
    /// — the same exchange the original `SubscribeRequest` arrived over,
    /// kept open for the subscription's lifetime rather than opening a
    /// fresh one per report.
    subscription_exchanges: Mutex<HashMap<u32, ExchangeKey>>,
    next_subscription_id: AtomicU32,
    max_chunk_bytes: usize,
    max_paths_per_invoke: usize,
    local_node_id: u64,
    schema: Arc<dyn Schema>,
    /// One `TimedInteractionGuard` per exchange that has ever sent a
    /// `TimedRequest` (spec.md §4.G.3/.4). Entries are lazily created on
    /// the first `TimedRequest` and removed when the exchange closes.
    timed_guards: Mutex<HashMap<ExchangeKey, TimedInteractionGuard>>,
}

impl InteractionModelHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<UdpTransport>,
        routing: Arc<SessionRouting>,
        sessions: Arc<SessionManager>,
        exchanges: Arc<ExchangeManager>,
        graph: EndpointGraph,
        onoff_handler: Arc<dyn CommandHandler>,
        fabrics: Arc<FabricRegistry>,
        identity: Arc<NodeIdentity>,
        max_chunk_bytes: usize,
        max_paths_per_invoke: usize,
        local_node_id: u64,
        schema: Arc<dyn Schema>,
    ) -> Self {
        InteractionModelHandler {
            transport,
            routing,
            sessions,
            exchanges,
            graph: Mutex::new(graph),
            onoff_handler,
            failsafe: Mutex::new(FailsafeContext::new()),
            fabrics,
            identity,
            subscriptions: Mutex::new(SubscriptionManager::new()),
            subscription_exchanges: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU32::new(1),
            max_chunk_bytes,
            max_paths_per_invoke,
            local_node_id,
            schema,
            timed_guards: Mutex::new(HashMap::new()),
        }
    }

    /// Consume this exchange's `TimedInteractionGuard` for a Write or
    /// Invoke landing at `now` (spec.md §4.G.3/.4). One-shot: a second
    /// Write/Invoke on the same exchange without a fresh `TimedRequest`
    /// always sees `armed: false, expired: false` (no guard was ever
    /// armed for it).
    fn consume_timed_guard(&self, key: ExchangeKey, now: std::time::Instant) -> TimedContext {
        let mut guards = self.timed_guards.lock().expect("lock poisoned");
        match guards.get_mut(&key) {
            Some(guard) => match guard.consume(now) {
                TimedCheck::Armed => TimedContext { armed: true, expired: false },
                TimedCheck::Expired => TimedContext { armed: false, expired: true },
                TimedCheck::NotArmed => TimedContext { armed: false, expired: false },
            },
            None => TimedContext { armed: false, expired: false },
        }
    }

    async fn handle_timed_request(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireTimedRequest>(payload) else {
            warn!("malformed TimedRequest");
            return;
        };
        let now = std::time::Instant::now();
        self.timed_guards
            .lock()
            .expect("lock poisoned")
            .entry(key)
            .or_default()
            .arm(now, std::time::Duration::from_millis(u64::from(wire.timeout_ms)));

        let response = WireStatusResponse { status: ImStatus::Success as u8 };
        let bytes = serde_json::to_vec(&response).expect("WireStatusResponse always serializes");
        self.send(key, im_opcode::STATUS_RESPONSE, bytes, false).await;
    }

    /// An inbound frame acked one of our prior sends on `key` (spec.md
    /// §4.G.5: subscription liveness tracks the peer's acks, not just its
    /// reports). If `key` backs a live subscription, that's proof the peer
    /// is still there, so its liveness deadline is pushed out.
    pub fn note_ack(&self, key: ExchangeKey) {
        let subscription_id = {
            let exchanges = self.subscription_exchanges.lock().expect("lock poisoned");
            exchanges.iter().find_map(|(id, k)| (*k == key).then_some(*id))
        };
        let Some(id) = subscription_id else { return };
        if let Some(sub) = self.subscriptions.lock().expect("lock poisoned").get_mut(id) {
            sub.last_ack_at = std::time::Instant::now();
        }
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&mut EndpointGraph) -> R) -> R {
        f(&mut self.graph.lock().expect("lock poisoned"))
    }

    fn peer_context(&self, session: Handle<matter_session::Session>) -> Option<PeerContext> {
        self.sessions.with_session(session, |s| PeerContext {
            subject: s.peer_node_id,
            peer: PeerAddress::new(s.fabric_index.unwrap_or(matter_types::FabricIndex::new(1).expect("1 is valid")), s.peer_node_id.unwrap_or(matter_types::NodeId(0))),
            fabric_index: s.fabric_index,
            arrived_over: if s.kind == SessionKind::Case { ArrivedOver::Case } else { ArrivedOver::Pase },
        })
    }

    /// `requires_ack` marks this send reliable (spec.md §4.C): the
    /// payload is registered with the exchange's `MrpState` so `tick`'s
    /// retransmit sweep covers it, and the peer is expected to eventually
    /// ack it. Subscription reports set this so a peer's ack is what
    /// proves the subscription is still alive (see [`Self::note_ack`]).
    async fn send(&self, key: ExchangeKey, opcode: u8, payload: Vec<u8>, requires_ack: bool) {
        let Some(addr) = self.routing.get(key.session) else {
            warn!(exchange_id = key.exchange_id, "no known peer address for session");
            return;
        };
        let Some((message_id, encrypt_key, local_session_id, peer_node_id)) = self
            .sessions
            .with_session_mut(key.session, |s| (s.send_counter.next(), s.encrypt_key, s.local_session_id, s.peer_node_id))
        else {
            warn!("session gone before reply could be sent");
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
        let payload_header = PayloadHeader {
            exchange_id: key.exchange_id,
            protocol_id: INTERACTION_MODEL,
            vendor_id: None,
            opcode,
            is_initiator: key.is_initiator,
            requires_ack,
            acknowledged_message_id: None,
        };
        let nonce = matter_crypto::unicast_nonce(security_flags.to_byte(), message_id, peer_node_id);
        match frame::encode_secure(&packet_header, &payload_header, &payload, &encrypt_key, &nonce) {
            Ok(bytes) => {
                if requires_ack {
                    self.exchanges.with_mrp(key, |mrp| mrp.register_send(message_id, bytes.clone(), std::time::Instant::now(), rand::random::<f64>()));
                }
                if let Err(error) = self.transport.send(addr, &bytes).await {
                    warn!(%error, "failed to send interaction model reply");
                }
            }
            Err(error) => warn!(%error, "failed to encode interaction model reply"),
        }
    }

    async fn send_report(&self, key: ExchangeKey, pages: Vec<Vec<ReportChunk>>, subscription_id: Option<u32>) {
        let requires_ack = subscription_id.is_some();
        if pages.is_empty() {
            let report = WireReportData { chunks: vec![], subscription_id, more_chunked_messages: false };
            let bytes = serde_json::to_vec(&report).expect("WireReportData always serializes");
            self.send(key, im_opcode::REPORT_DATA, bytes, requires_ack).await;
            return;
        }
        let last = pages.len() - 1;
        for (i, page) in pages.into_iter().enumerate() {
            let report = WireReportData {
                chunks: page.iter().map(chunk_to_wire).collect(),
                subscription_id,
                more_chunked_messages: i != last,
            };
            let bytes = serde_json::to_vec(&report).expect("WireReportData always serializes");
            self.send(key, im_opcode::REPORT_DATA, bytes, requires_ack).await;
        }
    }

    async fn handle_read_request(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireReadRequest>(payload) else {
            warn!("malformed ReadRequest");
            return;
        };
        let Some(ctx) = self.peer_context(key.session) else { return };
        let request = ReadRequest {
            attribute_paths: wire.attribute_paths.iter().map(to_attribute_path).collect(),
            event_paths: wire.event_paths.iter().map(to_event_path).collect(),
            data_version_filters: wire.data_version_filters.iter().map(to_data_version_filter).collect(),
            is_fabric_filtered: wire.is_fabric_filtered,
        };
        let pages = { read(&self.graph.lock().expect("lock poisoned"), &request, ctx.subject, self.max_chunk_bytes) };
        self.send_report(key, pages, None).await;
    }

    async fn handle_write_request(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireWriteRequest>(payload) else {
            warn!("malformed WriteRequest");
            return;
        };
        let Some(ctx) = self.peer_context(key.session) else { return };
        let writes: Vec<AttributeDataIn> = wire
            .writes
            .iter()
            .map(|w| AttributeDataIn {
                path: ConcreteAttributePath { endpoint: EndpointId(w.endpoint), cluster: ClusterId(w.cluster), attribute: AttributeId(w.attribute) },
                value: w.value.clone(),
                data_version: w.data_version,
                list_op: list_op_from_wire(w.list_op),
            })
            .collect();
        // `wire.timed` is no longer trusted: timed-interaction state comes
        // from this exchange's own TimedRequest guard instead of a
        // peer-supplied bool.
        let timed = self.consume_timed_guard(key, std::time::Instant::now());
        let outcome = {
            let mut graph = self.graph.lock().expect("lock poisoned");
            write(&mut graph, &writes, ctx.subject, &timed, self.schema.as_ref())
        };
        self.mark_dirty(&outcome.changed);

        if wire.suppress_response {
            return;
        }
        let response = WireWriteResponse {
            statuses: outcome
                .statuses
                .iter()
                .map(|s| WireWriteStatus { endpoint: s.path.endpoint.value(), cluster: s.path.cluster.value(), attribute: s.path.attribute.value(), status: s.status as u8 })
                .collect(),
        };
        let bytes = serde_json::to_vec(&response).expect("WireWriteResponse always serializes");
        self.send(key, im_opcode::WRITE_RESPONSE, bytes, false).await;
    }

    /// Fires `$Changed` only for attributes `write()` reports as actually
    /// changed (spec.md §4.G.3) — a write that bumps `dataVersion` without
    /// changing any value (e.g. rewriting the same boolean) is not reported.
    fn mark_dirty(&self, changed: &[ConcreteAttributePath]) {
        if changed.is_empty() {
            return;
        }
        let mut subscriptions = self.subscriptions.lock().expect("lock poisoned");
        for path in changed {
            for (_, sub) in subscriptions.iter_mut() {
                sub.mark_attribute_dirty(*path);
            }
        }
    }

    fn invoke_commissioning_command(&self, command: &CommandDataIn, ctx: &PeerContext) -> InvokeResponse {
        use commissioning::{general_commissioning_command, operational_credentials_command, GENERAL_COMMISSIONING_CLUSTER, OPERATIONAL_CREDENTIALS_CLUSTER};
        let path = command.path;

        if path.cluster == GENERAL_COMMISSIONING_CLUSTER && path.command == general_commissioning_command::ARM_FAIL_SAFE {
            let Ok(fields) = serde_json::from_value::<ArmFailSafeFields>(command.fields.clone()) else {
                return InvokeResponse::StatusError { path, status: ImStatus::InvalidCommand, cluster_status: None };
            };
            let mut failsafe = self.failsafe.lock().expect("lock poisoned");
            return match commissioning::arm_fail_safe(&mut failsafe, &self.fabrics, fields.expiry_length_seconds, ctx.arrived_over, std::time::Instant::now()) {
                Ok(()) => InvokeResponse::StatusSuccess { path },
                Err(status) => InvokeResponse::StatusError { path, status, cluster_status: None },
            };
        }

        if path.cluster == OPERATIONAL_CREDENTIALS_CLUSTER && path.command == operational_credentials_command::ADD_NOC {
            let Ok(fields) = serde_json::from_value::<AddNocFields>(command.fields.clone()) else {
                return InvokeResponse::StatusError { path, status: ImStatus::InvalidCommand, cluster_status: None };
            };
            let mut failsafe = self.failsafe.lock().expect("lock poisoned");
            let node_id = matter_types::NodeId(fields.node_id);
            return match commissioning::add_noc(
                &self.fabrics,
                &mut failsafe,
                fields.fabric_id,
                VendorId(fields.admin_vendor_id),
                node_id,
                fields.ipk_value,
                self.identity.noc(),
                self.identity.rcac(),
            ) {
                Ok(index) => InvokeResponse::Value { path, value: serde_json::json!({ "fabricIndex": index.value() }) },
                Err(status) => InvokeResponse::StatusError { path, status, cluster_status: None },
            };
        }

        debug_assert!(path.cluster == GENERAL_COMMISSIONING_CLUSTER && path.command == general_commissioning_command::COMMISSIONING_COMPLETE);
        let Some(fabric_index) = ctx.fabric_index else {
            return InvokeResponse::StatusError { path, status: ImStatus::FailsafeRequired, cluster_status: None };
        };
        let mut failsafe = self.failsafe.lock().expect("lock poisoned");
        match commissioning::commissioning_complete(&mut failsafe, fabric_index, ctx.arrived_over) {
            Ok(()) => InvokeResponse::StatusSuccess { path },
            Err(status) => InvokeResponse::StatusError { path, status, cluster_status: None },
        }
    }

    async fn handle_invoke_request(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireInvokeRequest>(payload) else {
            warn!("malformed InvokeRequest");
            return;
        };
        let Some(ctx) = self.peer_context(key.session) else { return };
        let commands: Vec<CommandDataIn> = wire
            .commands
            .iter()
            .map(|c| CommandDataIn {
                path: ConcreteCommandPath { endpoint: EndpointId(c.endpoint), cluster: ClusterId(c.cluster), command: matter_types::CommandId(c.command) },
                fields: c.fields.clone(),
            })
            .collect();

        // The three commissioning commands need session context (which
        // fabric/session-kind the request arrived over) that the generic
        // `CommandHandler` seam has no parameter for, so they're special-cased
        // ahead of it, exactly as `commissioning`'s module doc describes.
        // Responses land in two batches (commissioning first, then generic)
        // rather than preserving the original interleaving; fine for this
        // demo since every InvokeRequest it issues is either all
        // commissioning commands or all cluster commands, never a mix.
        let mut remaining = Vec::with_capacity(commands.len());
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            if commissioning::is_commissioning_path(command.path.cluster, command.path.command) {
                responses.push(self.invoke_commissioning_command(&command, &ctx));
            } else {
                remaining.push(command);
            }
        }
        let commands = remaining;

        // Same swap as `handle_write_request`: the exchange's own
        // TimedRequest guard decides timed-interaction state, not the
        // peer-supplied `wire.timed` bool.
        let timed = self.consume_timed_guard(key, std::time::Instant::now());
        let result = {
            let mut graph = self.graph.lock().expect("lock poisoned");
            matter_interaction::invoke(&mut graph, self.onoff_handler.as_ref(), self.max_paths_per_invoke, &commands, ctx.subject, &timed, self.schema.as_ref())
        };
        match result {
            Ok(generic_responses) => responses.extend(generic_responses),
            Err(status) => {
                warn!(%status, "invoke rejected up front");
                return;
            }
        }

        {
            // A command handler mutates attributes directly on the graph
            // rather than returning which ones changed, so the demo marks
            // every subscriber dirty for attribute 0 of the touched cluster
            // (the only attribute `OnOffCommandHandler` ever writes).
            let mut subscriptions = self.subscriptions.lock().expect("lock poisoned");
            for command in &commands {
                for (_, sub) in subscriptions.iter_mut() {
                    sub.mark_attribute_dirty(ConcreteAttributePath { endpoint: command.path.endpoint, cluster: command.path.cluster, attribute: AttributeId(0) });
                }
            }
        }

        let envelope = WireInvokeResponseEnvelope { responses: responses.iter().map(invoke_response_to_wire).collect() };
        let bytes = serde_json::to_vec(&envelope).expect("WireInvokeResponseEnvelope always serializes");
        self.send(key, im_opcode::INVOKE_RESPONSE, bytes, false).await;
    }

    async fn handle_subscribe_request(&self, key: ExchangeKey, payload: &[u8]) {
        let Ok(wire) = serde_json::from_slice::<WireSubscribeRequest>(payload) else {
            warn!("malformed SubscribeRequest");
            return;
        };
        let Some(ctx) = self.peer_context(key.session) else { return };
        let request = SubscribeRequest {
            min_interval_secs: wire.min_interval_secs,
            max_interval_secs: wire.max_interval_secs,
            attribute_paths: wire.attribute_paths.iter().map(to_attribute_path).collect(),
            event_paths: wire.event_paths.iter().map(to_event_path).collect(),
            data_version_filters: wire.data_version_filters.iter().map(to_data_version_filter).collect(),
            is_fabric_filtered: wire.is_fabric_filtered,
            keep_subscriptions: wire.keep_subscriptions,
        };

        let subscription_id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let accepted = {
            let graph = self.graph.lock().expect("lock poisoned");
            matter_interaction::accept_subscription(&graph, &request, ctx.subject, subscription_id, self.max_chunk_bytes)
        };

        {
            let mut subscriptions = self.subscriptions.lock().expect("lock poisoned");
            if !wire.keep_subscriptions {
                let cancelled = subscriptions.cancel_all_from_peer(ctx.peer);
                let mut exchanges = self.subscription_exchanges.lock().expect("lock poisoned");
                for id in cancelled {
                    exchanges.remove(&id);
                }
            }
            let now = std::time::Instant::now();
            subscriptions.insert(ServerSubscription {
                subscription_id,
                session: key.session,
                peer: ctx.peer,
                min_interval: std::time::Duration::from_secs(u64::from(request.min_interval_secs)),
                max_interval: std::time::Duration::from_secs(u64::from(request.max_interval_secs)),
                dirty: matter_subscription::DirtySet::new(),
                last_report_at: now,
                last_ack_at: now,
                fabric_filtered: request.is_fabric_filtered,
            });
        }
        self.subscription_exchanges.lock().expect("lock poisoned").insert(subscription_id, key);

        let wire_response = WireSubscribeResponse { subscription_id, min_interval_secs: accepted.min_interval_secs, max_interval_secs: accepted.max_interval_secs };
        let bytes = serde_json::to_vec(&wire_response).expect("WireSubscribeResponse always serializes");
        self.send(key, im_opcode::SUBSCRIBE_RESPONSE, bytes, false).await;
        self.send_report(key, accepted.priming_report, Some(subscription_id)).await;
    }

    /// Driven by `crate::run`'s timer tick (spec.md §4.I): if the failsafe
    /// window has expired without a matching `CommissioningComplete` or
    /// manual `ArmFailSafe(expiry=0)`, expire it and execute its rollback
    /// plan. A no-op while disarmed or still within its window.
    pub fn poll_failsafe_expiry(&self, now: std::time::Instant) {
        let mut failsafe = self.failsafe.lock().expect("lock poisoned");
        if !failsafe.is_due(now) {
            return;
        }
        if let Ok(plan) = failsafe.expire() {
            commissioning::execute_rollback(&plan, &self.fabrics);
        }
    }

    /// Driven by `crate::run`'s publishing tick (spec.md §4.H: "a single
    /// timer wheel per node"): emit a report for every subscription whose
    /// `next_due_at` has arrived, and cancel any that timed out.
    pub async fn service_subscriptions(&self) {
        let now = std::time::Instant::now();
        let (ready, timed_out) = {
            let subscriptions = self.subscriptions.lock().expect("lock poisoned");
            subscriptions.due_at(now)
        };

        for id in timed_out {
            self.subscriptions.lock().expect("lock poisoned").remove(id);
            self.subscription_exchanges.lock().expect("lock poisoned").remove(&id);
            warn!(subscription_id = id, "subscription liveness timeout");
        }

        for id in ready {
            let (paths, subject) = {
                let mut subscriptions = self.subscriptions.lock().expect("lock poisoned");
                let Some(sub) = subscriptions.get_mut(id) else { continue };
                let dirty_paths: Vec<ConcreteAttributePath> = sub
                    .dirty
                    .drain_attributes()
                    .into_iter()
                    .map(|(e, c, a)| ConcreteAttributePath { endpoint: EndpointId(e), cluster: ClusterId(c), attribute: AttributeId(a) })
                    .collect();
                sub.last_report_at = now;
                (dirty_paths, self.peer_context(sub.session).and_then(|c| c.subject))
            };
            let Some(key) = self.subscription_exchanges.lock().expect("lock poisoned").get(&id).copied() else { continue };

            let request = ReadRequest {
                attribute_paths: paths.into_iter().map(|p| AttributePath { endpoint: Some(p.endpoint), cluster: Some(p.cluster), attribute: Some(p.attribute), list_index: None }).collect(),
                event_paths: vec![],
                data_version_filters: vec![],
                is_fabric_filtered: false,
            };
            let pages = { read(&self.graph.lock().expect("lock poisoned"), &request, subject, self.max_chunk_bytes) };
            self.send_report(key, pages, Some(id)).await;
        }
    }
}

#[async_trait]
impl ProtocolHandler for InteractionModelHandler {
    async fn on_message(&self, key: ExchangeKey, opcode: u8, payload: &[u8]) {
        match opcode {
            im_opcode::READ_REQUEST => self.handle_read_request(key, payload).await,
            im_opcode::WRITE_REQUEST => self.handle_write_request(key, payload).await,
            im_opcode::INVOKE_REQUEST => self.handle_invoke_request(key, payload).await,
            im_opcode::SUBSCRIBE_REQUEST => self.handle_subscribe_request(key, payload).await,
            im_opcode::TIMED_REQUEST => self.handle_timed_request(key, payload).await,
            other => warn!(opcode = other, "interaction model: unexpected opcode"),
        }
    }

    async fn on_exchange_closed(&self, key: ExchangeKey) {
        self.timed_guards.lock().expect("lock poisoned").remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_demo;
    use matter_fabric::store::MemoryFabricStore;
    use matter_session::{Session, OUR_DEFAULTS};
    use matter_wire::{WireAttributeData, WireCommandData};
    use std::time::Duration;

    const PEER_NODE_ID: u64 = 99;
    const SESSION_KEY: [u8; 16] = [7u8; 16];

    async fn setup() -> (Arc<InteractionModelHandler>, tokio::net::UdpSocket, ExchangeKey) {
        let (node_transport, _node_rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer_socket.local_addr().unwrap();

        let sessions = Arc::new(SessionManager::new());
        let session = sessions.insert(Session::new(
            SessionKind::Case,
            10,
            20,
            Some(matter_types::NodeId(PEER_NODE_ID)),
            Some(matter_types::FabricIndex::new(1).unwrap()),
            SESSION_KEY,
            SESSION_KEY,
            [0u8; 32],
            1,
            OUR_DEFAULTS,
        ));

        let routing = Arc::new(SessionRouting::new());
        routing.record(session, peer_addr);

        let graph = endpoint_demo::build(Some(matter_types::NodeId(PEER_NODE_ID)));
        let onoff_handler: Arc<dyn CommandHandler> = Arc::new(endpoint_demo::OnOffCommandHandler);
        let fabrics = Arc::new(FabricRegistry::load(Arc::new(MemoryFabricStore::new())).unwrap());
        let identity = Arc::new(NodeIdentity::new(matter_types::NodeId(1)));
        let exchanges = Arc::new(matter_exchange::ExchangeManager::new());

        let handler = Arc::new(InteractionModelHandler::new(
            Arc::new(node_transport),
            routing,
            sessions,
            Arc::clone(&exchanges),
            graph,
            onoff_handler,
            fabrics,
            identity,
            1024,
            8,
            1,
            Arc::new(endpoint_demo::schema()),
        ));

        let key = ExchangeKey { session, exchange_id: 1, is_initiator: true };
        (handler, peer_socket, key)
    }

    /// Opens a reply frame this handler sent, recovering the nonce from the
    /// cleartext packet header exactly as a real peer would (destination
    /// node id ‖ message id), the same convention `frame`'s own tests pin.
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
        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await.expect("reply timed out").unwrap();
        decode_reply(&buf[..len])
    }

    #[tokio::test]
    async fn read_request_returns_current_attribute_value() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireReadRequest {
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(endpoint_demo::ONOFF_CLUSTER.value()), attribute: Some(endpoint_demo::ONOFF_ATTRIBUTE.value()), list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
        };
        handler.handle_read_request(key, &serde_json::to_vec(&wire).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::REPORT_DATA);
        let report: WireReportData = serde_json::from_slice(&payload).unwrap();
        assert_eq!(report.chunks.len(), 1);
        match &report.chunks[0] {
            WireReportChunk::Attribute { value, .. } => assert_eq!(*value, serde_json::json!(false)),
            other => panic!("unexpected chunk {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_request_updates_attribute_and_replies_success() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireWriteRequest {
            writes: vec![WireAttributeData {
                endpoint: 1,
                cluster: endpoint_demo::ONOFF_CLUSTER.value(),
                attribute: endpoint_demo::ONOFF_ATTRIBUTE.value(),
                value: serde_json::json!(true),
                data_version: None,
                list_op: WireListOp::Replace,
            }],
            timed: false,
            suppress_response: false,
        };
        handler.handle_write_request(key, &serde_json::to_vec(&wire).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::WRITE_RESPONSE);
        let response: WireWriteResponse = serde_json::from_slice(&payload).unwrap();
        assert_eq!(response.statuses.len(), 1);
        assert_eq!(response.statuses[0].status, ImStatus::Success as u8);

        handler.with_graph(|graph| {
            let cluster = &graph.get(EndpointId(1)).unwrap().clusters[&endpoint_demo::ONOFF_CLUSTER];
            assert_eq!(cluster.attributes[&endpoint_demo::ONOFF_ATTRIBUTE], serde_json::json!(true));
        });
    }

    #[tokio::test]
    async fn invoke_toggle_command_flips_attribute_and_replies_success() {
        let (handler, peer_socket, key) = setup().await;
        let wire = WireInvokeRequest {
            commands: vec![WireCommandData { endpoint: 1, cluster: endpoint_demo::ONOFF_CLUSTER.value(), command: endpoint_demo::onoff_command::TOGGLE.value(), fields: serde_json::Value::Null }],
            timed: false,
        };
        handler.handle_invoke_request(key, &serde_json::to_vec(&wire).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::INVOKE_RESPONSE);
        let envelope: WireInvokeResponseEnvelope = serde_json::from_slice(&payload).unwrap();
        assert_eq!(envelope.responses.len(), 1);
        assert!(matches!(envelope.responses[0], WireInvokeResponse::StatusSuccess { .. }));

        handler.with_graph(|graph| {
            let cluster = &graph.get(EndpointId(1)).unwrap().clusters[&endpoint_demo::ONOFF_CLUSTER];
            assert_eq!(cluster.attributes[&endpoint_demo::ONOFF_ATTRIBUTE], serde_json::json!(true));
        });
    }

    #[tokio::test]
    async fn subscribe_then_write_is_followed_by_a_service_subscriptions_report() {
        let (handler, peer_socket, key) = setup().await;
        let subscribe_wire = WireSubscribeRequest {
            min_interval_secs: 0,
            max_interval_secs: 60,
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(endpoint_demo::ONOFF_CLUSTER.value()), attribute: Some(endpoint_demo::ONOFF_ATTRIBUTE.value()), list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
            keep_subscriptions: true,
        };
        handler.handle_subscribe_request(key, &serde_json::to_vec(&subscribe_wire).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::SUBSCRIBE_RESPONSE);
        let response: WireSubscribeResponse = serde_json::from_slice(&payload).unwrap();
        let subscription_id = response.subscription_id;

        let (payload_header, _) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::REPORT_DATA, "priming report");

        let write_wire = WireWriteRequest {
            writes: vec![WireAttributeData {
                endpoint: 1,
                cluster: endpoint_demo::ONOFF_CLUSTER.value(),
                attribute: endpoint_demo::ONOFF_ATTRIBUTE.value(),
                value: serde_json::json!(true),
                data_version: None,
                list_op: WireListOp::Replace,
            }],
            timed: false,
            suppress_response: false,
        };
        handler.handle_write_request(key, &serde_json::to_vec(&write_wire).unwrap()).await;
        let (payload_header, _) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::WRITE_RESPONSE);

        handler.service_subscriptions().await;
        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::REPORT_DATA);
        let report: WireReportData = serde_json::from_slice(&payload).unwrap();
        assert_eq!(report.subscription_id, Some(subscription_id));
        assert_eq!(report.chunks.len(), 1);
        match &report.chunks[0] {
            WireReportChunk::Attribute { value, .. } => assert_eq!(*value, serde_json::json!(true)),
            other => panic!("unexpected chunk {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscription_timeout_removes_it_from_both_maps() {
        let (handler, _peer_socket, key) = setup().await;
        let subscribe_wire = WireSubscribeRequest {
            min_interval_secs: 0,
            max_interval_secs: 0,
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(endpoint_demo::ONOFF_CLUSTER.value()), attribute: Some(endpoint_demo::ONOFF_ATTRIBUTE.value()), list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
            keep_subscriptions: true,
        };
        handler.handle_subscribe_request(key, &serde_json::to_vec(&subscribe_wire).unwrap()).await;
        assert_eq!(handler.subscriptions.lock().unwrap().len(), 1);

        // `maxInterval=0` plus the liveness slack means any subsequent tick
        // observes the subscription as timed out immediately.
        std::thread::sleep(matter_subscription::RESUBSCRIBE_SLACK + Duration::from_millis(5));
        handler.service_subscriptions().await;

        assert!(handler.subscriptions.lock().unwrap().is_empty());
        assert!(handler.subscription_exchanges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_report_requests_an_ack() {
        let (handler, peer_socket, key) = setup().await;
        let subscribe_wire = WireSubscribeRequest {
            min_interval_secs: 0,
            max_interval_secs: 60,
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(endpoint_demo::ONOFF_CLUSTER.value()), attribute: Some(endpoint_demo::ONOFF_ATTRIBUTE.value()), list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
            keep_subscriptions: true,
        };
        handler.handle_subscribe_request(key, &serde_json::to_vec(&subscribe_wire).unwrap()).await;
        recv_reply(&peer_socket).await; // SubscribeResponse, not reliable

        let (payload_header, _) = recv_reply(&peer_socket).await; // priming ReportData
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::REPORT_DATA);
        assert!(payload_header.requires_ack, "subscription reports must ask the peer to ack them");
    }

    #[tokio::test]
    async fn acking_a_subscription_exchange_refreshes_its_liveness_deadline() {
        let (handler, _peer_socket, key) = setup().await;
        let subscribe_wire = WireSubscribeRequest {
            min_interval_secs: 0,
            max_interval_secs: 60,
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(endpoint_demo::ONOFF_CLUSTER.value()), attribute: Some(endpoint_demo::ONOFF_ATTRIBUTE.value()), list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
            keep_subscriptions: true,
        };
        handler.handle_subscribe_request(key, &serde_json::to_vec(&subscribe_wire).unwrap()).await;

        let stale_ack_at = handler.subscriptions.lock().unwrap().get_mut(1).unwrap().last_ack_at;
        std::thread::sleep(Duration::from_millis(5));
        handler.note_ack(key);
        let refreshed_ack_at = handler.subscriptions.lock().unwrap().get_mut(1).unwrap().last_ack_at;
        assert!(refreshed_ack_at > stale_ack_at);
    }

    #[tokio::test]
    async fn acking_an_unrelated_exchange_is_a_noop() {
        let (handler, _peer_socket, key) = setup().await;
        // No subscription lives on `key` yet; must not panic or create one.
        handler.note_ack(key);
        assert!(handler.subscriptions.lock().unwrap().is_empty());
    }

    fn invoke_on_wire() -> WireInvokeRequest {
        WireInvokeRequest {
            commands: vec![WireCommandData { endpoint: 1, cluster: endpoint_demo::ONOFF_CLUSTER.value(), command: endpoint_demo::onoff_command::ON.value(), fields: serde_json::Value::Null }],
            timed: false,
        }
    }

    #[tokio::test]
    async fn timed_invoke_without_a_preceding_timed_request_is_rejected() {
        let (handler, peer_socket, key) = setup().await;
        handler.handle_invoke_request(key, &serde_json::to_vec(&invoke_on_wire()).unwrap()).await;

        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::INVOKE_RESPONSE);
        let envelope: WireInvokeResponseEnvelope = serde_json::from_slice(&payload).unwrap();
        assert!(matches!(envelope.responses[0], WireInvokeResponse::StatusError { status, .. } if status == ImStatus::NeedsTimedInteraction as u8));
    }

    #[tokio::test]
    async fn timed_request_then_invoke_inside_the_window_succeeds() {
        let (handler, peer_socket, key) = setup().await;
        let timed_wire = matter_wire::WireTimedRequest { timeout_ms: 5_000 };
        handler.handle_timed_request(key, &serde_json::to_vec(&timed_wire).unwrap()).await;
        let (payload_header, _) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::STATUS_RESPONSE);

        handler.handle_invoke_request(key, &serde_json::to_vec(&invoke_on_wire()).unwrap()).await;
        let (payload_header, payload) = recv_reply(&peer_socket).await;
        assert_eq!(payload_header.opcode, matter_wire::protocol::im_opcode::INVOKE_RESPONSE);
        let envelope: WireInvokeResponseEnvelope = serde_json::from_slice(&payload).unwrap();
        assert!(matches!(envelope.responses[0], WireInvokeResponse::StatusSuccess { .. }));
    }

    #[tokio::test]
    async fn timed_request_window_is_one_shot() {
        let (handler, peer_socket, key) = setup().await;
        let timed_wire = matter_wire::WireTimedRequest { timeout_ms: 5_000 };
        handler.handle_timed_request(key, &serde_json::to_vec(&timed_wire).unwrap()).await;
        recv_reply(&peer_socket).await;

        handler.handle_invoke_request(key, &serde_json::to_vec(&invoke_on_wire()).unwrap()).await;
        recv_reply(&peer_socket).await;

        // The guard was consumed by the first Invoke; a second one without
        // a fresh TimedRequest is rejected again.
        handler.handle_invoke_request(key, &serde_json::to_vec(&invoke_on_wire()).unwrap()).await;
        let (_, payload) = recv_reply(&peer_socket).await;
        let envelope: WireInvokeResponseEnvelope = serde_json::from_slice(&payload).unwrap();
        assert!(matches!(envelope.responses[0], WireInvokeResponse::StatusError { status, .. } if status == ImStatus::NeedsTimedInteraction as u8));
    }
}
