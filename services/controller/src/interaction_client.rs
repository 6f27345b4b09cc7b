//! Interaction Model client: Read/Write/Invoke/Subscribe against the
//! on-off light at endpoint 1 (the same demo cluster `services/node`'s
//! `endpoint_demo` exposes), the counterpart of `services/node`'s
//! `interaction::InteractionModelHandler`.

use crate::error::ControllerError;
use crate::link::SecureLink;
use matter_transport::InboundMessage;
use matter_wire::protocol::{im_opcode, INTERACTION_MODEL};
use matter_wire::{
    WireAttributeData, WireAttributePath, WireCommandData, WireInvokeRequest, WireInvokeResponse, WireInvokeResponseEnvelope,
    WireListOp, WireReadRequest, WireReportChunk, WireReportData, WireSubscribeRequest, WireSubscribeResponse, WireWriteRequest, WireWriteResponse,
};
use tokio::sync::mpsc;
use tracing::info;

pub const ONOFF_ENDPOINT: u16 = 1;
pub const ONOFF_CLUSTER: u32 = 0x0006;
pub const ONOFF_ATTRIBUTE: u32 = 0x0000;

pub mod onoff_command {
    pub const OFF: u32 = 0x00;
    pub const ON: u32 = 0x01;
    pub const TOGGLE: u32 = 0x02;
}

const DEMO_EXCHANGE_ID: u16 = 2;
/// The exchange a server subscription's ongoing reports ride — fixed and
/// distinct from the one-shot request/response exchanges above, since a
/// subscription's reports keep arriving on this id for as long as it's
/// alive.
pub const SUBSCRIPTION_EXCHANGE_ID: u16 = 3;

pub async fn read_onoff(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>) -> Result<bool, ControllerError> {
    let request = WireReadRequest {
        attribute_paths: vec![WireAttributePath { endpoint: Some(ONOFF_ENDPOINT), cluster: Some(ONOFF_CLUSTER), attribute: Some(ONOFF_ATTRIBUTE), list_index: None }],
        event_paths: vec![],
        data_version_filters: vec![],
        is_fabric_filtered: true,
    };
    let bytes = serde_json::to_vec(&request).expect("WireReadRequest always serializes");
    link.send(DEMO_EXCHANGE_ID, INTERACTION_MODEL, im_opcode::READ_REQUEST, true, bytes).await?;

    let (header, payload) = link.recv(inbound).await?;
    if header.opcode != im_opcode::REPORT_DATA {
        return Err(ControllerError::MalformedMessage(format!("expected ReportData, got opcode {}", header.opcode)));
    }
    let report: WireReportData = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("ReportData: {e}")))?;
    for chunk in report.chunks {
        if let WireReportChunk::Attribute { attribute, value, .. } = chunk {
            if attribute == ONOFF_ATTRIBUTE {
                return value.as_bool().ok_or_else(|| ControllerError::MalformedMessage("on/off attribute was not a bool".to_owned()));
            }
        }
    }
    Err(ControllerError::MalformedMessage("ReportData had no on/off attribute chunk".to_owned()))
}

pub async fn write_onoff(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>, value: bool) -> Result<(), ControllerError> {
    let request = WireWriteRequest {
        writes: vec![WireAttributeData { endpoint: ONOFF_ENDPOINT, cluster: ONOFF_CLUSTER, attribute: ONOFF_ATTRIBUTE, value: serde_json::json!(value), data_version: None, list_op: WireListOp::Replace }],
        timed: false,
        suppress_response: false,
    };
    let bytes = serde_json::to_vec(&request).expect("WireWriteRequest always serializes");
    link.send(DEMO_EXCHANGE_ID, INTERACTION_MODEL, im_opcode::WRITE_REQUEST, true, bytes).await?;

    let (header, payload) = link.recv(inbound).await?;
    if header.opcode != im_opcode::WRITE_RESPONSE {
        return Err(ControllerError::MalformedMessage(format!("expected WriteResponse, got opcode {}", header.opcode)));
    }
    let response: WireWriteResponse = serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("WriteResponse: {e}")))?;
    for status in response.statuses {
        if status.status != 0 {
            return Err(ControllerError::Rejected(format!("write rejected with status {}", status.status)));
        }
    }
    info!(value, "wrote on/off attribute");
    Ok(())
}

pub async fn invoke_onoff(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>, command: u32) -> Result<(), ControllerError> {
    let request = WireInvokeRequest { commands: vec![WireCommandData { endpoint: ONOFF_ENDPOINT, cluster: ONOFF_CLUSTER, command, fields: serde_json::Value::Null }], timed: false };
    let bytes = serde_json::to_vec(&request).expect("WireInvokeRequest always serializes");
    link.send(DEMO_EXCHANGE_ID, INTERACTION_MODEL, im_opcode::INVOKE_REQUEST, true, bytes).await?;

    let (header, payload) = link.recv(inbound).await?;
    if header.opcode != im_opcode::INVOKE_RESPONSE {
        return Err(ControllerError::MalformedMessage(format!("expected InvokeResponse, got opcode {}", header.opcode)));
    }
    let envelope: WireInvokeResponseEnvelope =
        serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("InvokeResponseEnvelope: {e}")))?;
    match envelope.responses.first() {
        Some(WireInvokeResponse::StatusError { status, .. }) => Err(ControllerError::Rejected(format!("on/off command rejected with status {status}"))),
        Some(_) => {
            info!(command, "on/off command succeeded");
            Ok(())
        }
        None => Err(ControllerError::MalformedMessage("empty InvokeResponseEnvelope".to_owned())),
    }
}

/// Subscribes to the on/off attribute and returns the subscription id plus
/// the negotiated reporting interval. Ongoing reports keep arriving on
/// [`SUBSCRIPTION_EXCHANGE_ID`] — the same exchange the `SubscribeRequest`
/// itself rode over, mirroring `services/node`'s
/// `InteractionModelHandler::service_subscriptions` reuse of the original
/// exchange for a subscription's lifetime.
pub async fn subscribe_onoff(
    link: &SecureLink,
    inbound: &mut mpsc::Receiver<InboundMessage>,
    min_interval_secs: u16,
    max_interval_secs: u16,
) -> Result<WireSubscribeResponse, ControllerError> {
    let request = WireSubscribeRequest {
        min_interval_secs,
        max_interval_secs,
        attribute_paths: vec![WireAttributePath { endpoint: Some(ONOFF_ENDPOINT), cluster: Some(ONOFF_CLUSTER), attribute: Some(ONOFF_ATTRIBUTE), list_index: None }],
        event_paths: vec![],
        data_version_filters: vec![],
        is_fabric_filtered: true,
        keep_subscriptions: false,
    };
    let bytes = serde_json::to_vec(&request).expect("WireSubscribeRequest always serializes");
    link.send(SUBSCRIPTION_EXCHANGE_ID, INTERACTION_MODEL, im_opcode::SUBSCRIBE_REQUEST, true, bytes).await?;

    loop {
        let (header, payload) = link.recv(inbound).await?;
        match header.opcode {
            im_opcode::REPORT_DATA => continue,
            im_opcode::SUBSCRIBE_RESPONSE => {
                let response: WireSubscribeResponse =
                    serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("SubscribeResponse: {e}")))?;
                info!(subscription_id = response.subscription_id, "subscribed to on/off attribute");
                return Ok(response);
            }
            other => return Err(ControllerError::MalformedMessage(format!("unexpected opcode {other} while awaiting SubscribeResponse"))),
        }
    }
}

/// Waits for the next ongoing report on a live subscription.
pub async fn next_report(link: &SecureLink, inbound: &mut mpsc::Receiver<InboundMessage>) -> Result<WireReportData, ControllerError> {
    let (header, payload) = link.recv(inbound).await?;
    if header.opcode != im_opcode::REPORT_DATA {
        return Err(ControllerError::MalformedMessage(format!("expected ReportData, got opcode {}", header.opcode)));
    }
    serde_json::from_slice(&payload).map_err(|e| ControllerError::MalformedMessage(format!("ReportData: {e}")))
}
