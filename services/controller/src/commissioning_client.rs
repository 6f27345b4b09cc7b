//! The three Invoke commands that make up commissioning (spec.md-style
//! control plane), duplicated from `services/node`'s
//! `commissioning::{GENERAL_COMMISSIONING_CLUSTER, OPERATIONAL_CREDENTIALS_CLUSTER}`
//! constants rather than depended on: cross-service code lives in
//! `crates/*`, never in another service's binary crate.

use crate::error::ControllerError;
use crate::link::SecureLink;
use matter_transport::InboundMessage;
use matter_wire::protocol::{im_opcode, INTERACTION_MODEL};
use matter_wire::{WireCommandData, WireInvokeRequest, WireInvokeResponse, WireInvokeResponseEnvelope};
use tokio::sync::mpsc;
use tracing::info;

pub const GENERAL_COMMISSIONING_CLUSTER: u32 = 0x0030;
pub const OPERATIONAL_CREDENTIALS_CLUSTER: u32 = 0x003E;

pub mod general_commissioning_command {
    pub const ARM_FAIL_SAFE: u32 = 0x00;
    pub const COMMISSIONING_COMPLETE: u32 = 0x04;
}

pub mod operational_credentials_command {
    pub const ADD_NOC: u32 = 0x06;
}

const COMMISSIONING_ENDPOINT: u16 = 0;
const COMMISSIONING_EXCHANGE_ID: u16 = 1;

async fn invoke_single(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>, cluster: u32, command: u32, fields: serde_json::Value) -> Result<WireInvokeResponse, ControllerError> {
    let request = WireInvokeRequest { commands: vec![WireCommandData { endpoint: COMMISSIONING_ENDPOINT, cluster, command, fields }], timed: false };
    let bytes = serde_json::to_vec(&request).expect("WireInvokeRequest always serializes");
    link.send(COMMISSIONING_EXCHANGE_ID, INTERACTION_MODEL, im_opcode::INVOKE_REQUEST, true, bytes).await?;

    let (header, payload) = link.recv(inbound).await?;
    if header.opcode != im_opcode::INVOKE_RESPONSE {
        return Err(ControllerError::MalformedMessage(format!("expected InvokeResponse, got opcode {}", header.opcode)));
    }
    let mut envelope: WireInvokeResponseEnvelope =
        serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("InvokeResponseEnvelope: {e}")))?;
    envelope.responses.pop().ok_or_else(|| ControllerError::MalformedMessage("empty InvokeResponseEnvelope".to_owned()))
}

fn check_success(response: WireInvokeResponse, what: &str) -> Result<WireInvokeResponse, ControllerError> {
    match &response {
        WireInvokeResponse::StatusError { status, .. } => Err(ControllerError::Rejected(format!("{what} failed with status {status}"))),
        _ => Ok(response),
    }
}

/// `ArmFailSafe(expiryLengthSeconds)`, sent over the just-established PASE
/// session.
pub async fn arm_fail_safe(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>, expiry_seconds: u16) -> Result<(), ControllerError> {
    let fields = serde_json::json!({ "expiry_length_seconds": expiry_seconds });
    let response = invoke_single(link, inbound, GENERAL_COMMISSIONING_CLUSTER, general_commissioning_command::ARM_FAIL_SAFE, fields).await?;
    check_success(response, "ArmFailSafe")?;
    info!("ArmFailSafe succeeded");
    Ok(())
}

/// `AddNOC(fabricId, adminVendorId, nodeId, ipkValue)`, also sent over
/// PASE. The node issues its own NOC/RCAC from the `nodeId` claimed here
/// (the demo's self-issued-certificate simplification); this commissioner
/// already knows that id out of band (its config), so there is nothing to
/// parse out of the reply beyond the assigned fabric index.
pub async fn add_noc(
    link: &SecureLink,
    inbound: &mut mpsc::Receiver<InboundMessage>,
    fabric_id: u64,
    admin_vendor_id: u16,
    node_id: u64,
    ipk_value: [u8; 16],
) -> Result<u8, ControllerError> {
    let fields = serde_json::json!({
        "fabric_id": fabric_id,
        "admin_vendor_id": admin_vendor_id,
        "node_id": node_id,
        "ipk_value": ipk_value,
    });
    let response = invoke_single(link, inbound, OPERATIONAL_CREDENTIALS_CLUSTER, operational_credentials_command::ADD_NOC, fields).await?;
    let response = check_success(response, "AddNOC")?;
    let fabric_index = match response {
        WireInvokeResponse::Value { value, .. } => value
            .get("fabricIndex")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ControllerError::MalformedMessage("AddNOC response missing fabricIndex".to_owned()))?,
        _ => return Err(ControllerError::MalformedMessage("AddNOC response missing fabricIndex".to_owned())),
    };
    info!(fabric_index, "AddNOC succeeded");
    Ok(fabric_index as u8)
}

/// `CommissioningComplete()`, sent over the freshly-established CASE
/// session — required, since the node rejects this command unless
/// `ctx.fabric_index` is `Some`, which only holds for CASE sessions.
pub async fn commissioning_complete(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>) -> Result<(), ControllerError> {
    let response = invoke_single(link, inbound, GENERAL_COMMISSIONING_CLUSTER, general_commissioning_command::COMMISSIONING_COMPLETE, serde_json::Value::Null).await?;
    check_success(response, "CommissioningComplete")?;
    info!("CommissioningComplete succeeded");
    Ok(())
}
