//! The demo Matter controller binary (spec.md §1 scope): a one-shot
//! commissioner that drives PASE, `ArmFailSafe`/`AddNOC`/
//! `CommissioningComplete`, establishes CASE over the freshly joined
//! fabric, and exercises Read/Invoke against the node's on/off light —
//! the client-side half of spec.md §8's S1 scenario.
//!
//! Mirrors `services/node`'s `run` in shape: construct the transport and
//! identity, then drive the handshakes and interactions to completion.
//! Unlike the node, this binary has no standing event loop — it is a
//! single commissioning run, the client-side counterpart of a CLI tool
//! rather than a long-lived service.

pub mod case_client;
pub mod commissioning_client;
pub mod config;
pub mod error;
pub mod frame;
pub mod identity;
pub mod interaction_client;
pub mod link;
pub mod pase_client;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::identity::ControllerIdentity;
use matter_transport::{Transport, UdpTransport};
use matter_types::NodeId;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// ArmFailSafe's expiry, generous enough to cover the whole commissioning
/// run (PASE + AddNOC + CASE + CommissioningComplete) without expiring
/// mid-flight; spec.md §4.I's default `maxCumulativeFailsafe` is 900s, far
/// above what this demo run needs.
const FAIL_SAFE_EXPIRY_SECONDS: u16 = 60;

/// Runs the full commission-then-interact flow against `config.target`,
/// returning once the on/off light has been toggled.
pub async fn run(config: ControllerConfig) -> Result<(), ControllerError> {
    let bind_addr: SocketAddr = config.listen.udp_bind.parse().map_err(|_| ControllerError::MalformedMessage(format!("invalid listen address '{}'", config.listen.udp_bind)))?;
    let peer_addr: SocketAddr = config.target.addr.parse().map_err(|_| ControllerError::MalformedMessage(format!("invalid target address '{}'", config.target.addr)))?;

    let (transport, mut inbound) = UdpTransport::bind(bind_addr).await?;
    let transport = Arc::new(transport);
    info!(local = %bind_addr, peer = %peer_addr, "controller starting commissioning run");

    let identity = ControllerIdentity::new(NodeId(config.fabric.admin_node_id));

    // --- PASE over the unsecured channel ---
    let pase_link = pase_client::establish(Arc::clone(&transport), &mut inbound, peer_addr, identity.node_id.value(), config.target.node_id, config.target.passcode).await?;
    info!("PASE established");

    commissioning_client::arm_fail_safe(&pase_link, &mut inbound, FAIL_SAFE_EXPIRY_SECONDS).await?;
    let fabric_index = commissioning_client::add_noc(&pase_link, &mut inbound, config.fabric.fabric_id, config.fabric.vendor_id, config.target.node_id, config.fabric.ipk_value).await?;
    info!(fabric_index, "node joined fabric");

    // --- CASE over the now-operational fabric ---
    let case_link = case_client::establish(Arc::clone(&transport), &mut inbound, peer_addr, &identity, config.target.node_id, config.fabric.fabric_id, config.fabric.ipk_value).await?;
    info!("CASE established");

    commissioning_client::commissioning_complete(&case_link, &mut inbound).await?;
    info!("commissioning complete");

    // --- Interact: read the current value, then toggle it ---
    let before = interaction_client::read_onoff(&case_link, &mut inbound).await?;
    info!(before, "read on/off attribute");
    interaction_client::invoke_onoff(&case_link, &mut inbound, interaction_client::onoff_command::TOGGLE).await?;
    let after = interaction_client::read_onoff(&case_link, &mut inbound).await?;
    info!(before, after, "toggled on/off attribute");

    transport.close().await?;
    Ok(())
}
