//! Shared wire-message DTOs for the `services/node` and
//! `services/controller` demo binaries.
//!
//! Real Matter TLV encoding is an external primitive (spec.md §1) and the
//! cluster data-model is an opaque `Schema` collaborator; this crate is the
//! concrete, JSON-based substitute the two binaries serialize application
//! payloads against, the same role `rt-protocol` plays for the
//! forwarder/receiver/server binaries: one shared, versioned vocabulary
//! instead of each side hand-rolling its own framing.
//!
//! Every message here rides inside a `matter-codec::Packet`'s `payload`
//! (for the unsecured PASE/CASE handshake) or behind AEAD (for the
//! Interaction Model protocol, once a session is secure); this crate only
//! owns the *contents* of that payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod protocol {
    //! Protocol IDs and opcodes, matching the Matter core specification's
    //! own numbering for the Secure Channel and Interaction Model
    //! protocols (the numbering itself is a wire-format detail in scope;
    //! the TLV payload shape behind each opcode is not, per spec.md §1).

    pub const SECURE_CHANNEL: u16 = 0x0000;
    pub const INTERACTION_MODEL: u16 = 0x0001;

    pub mod secure_channel_opcode {
        pub const PBKDF_PARAM_REQUEST: u8 = 0x20;
        pub const PBKDF_PARAM_RESPONSE: u8 = 0x21;
        pub const PASE_PAKE1: u8 = 0x22;
        pub const PASE_PAKE2: u8 = 0x23;
        pub const PASE_PAKE3: u8 = 0x24;
        pub const CASE_SIGMA1: u8 = 0x30;
        pub const CASE_SIGMA2: u8 = 0x31;
        pub const CASE_SIGMA3: u8 = 0x32;
        pub const CASE_SIGMA2_RESUME: u8 = 0x33;
        pub const STATUS_REPORT: u8 = 0x40;
    }

    pub mod im_opcode {
        pub const STATUS_RESPONSE: u8 = 0x01;
        pub const READ_REQUEST: u8 = 0x02;
        pub const SUBSCRIBE_REQUEST: u8 = 0x03;
        pub const SUBSCRIBE_RESPONSE: u8 = 0x04;
        pub const REPORT_DATA: u8 = 0x05;
        pub const WRITE_REQUEST: u8 = 0x06;
        pub const WRITE_RESPONSE: u8 = 0x07;
        pub const INVOKE_REQUEST: u8 = 0x08;
        pub const INVOKE_RESPONSE: u8 = 0x09;
        pub const TIMED_REQUEST: u8 = 0x0A;
    }

    /// spec.md §4.J: Bulk Data eXchange, used for OTA image transfer.
    pub const BDX: u16 = 0x0002;

    pub mod bdx_opcode {
        pub const SEND_INIT: u8 = 0x01;
        pub const SEND_ACCEPT: u8 = 0x02;
        pub const RECEIVE_INIT: u8 = 0x03;
        pub const RECEIVE_ACCEPT: u8 = 0x04;
        pub const BLOCK_QUERY: u8 = 0x05;
        pub const BLOCK: u8 = 0x06;
        pub const BLOCK_EOF: u8 = 0x07;
        pub const BLOCK_ACK: u8 = 0x08;
        pub const BLOCK_ACK_EOF: u8 = 0x09;
        pub const BLOCK_QUERY_WITH_SKIP: u8 = 0x0A;
        pub const BLOCK_STATUS_REPORT: u8 = 0x0B;
    }
}

// ---------------------------------------------------------------------------
// Secure Channel: PASE
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePbkdfParamRequest {
    pub initiator_random: Vec<u8>,
    pub initiator_session_id: u16,
    pub passcode_id: u16,
    pub has_pbkdf_params: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePbkdfParamResponse {
    pub responder_random: Vec<u8>,
    pub responder_session_id: u16,
    pub pbkdf_iterations: Option<u32>,
    pub pbkdf_salt: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePake1 {
    pub x: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePake2 {
    pub y: Vec<u8>,
    pub h_bx: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePake3 {
    pub h_ay: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Secure Channel: CASE
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSigma1 {
    pub initiator_random: Vec<u8>,
    pub initiator_session_id: u16,
    pub destination_id: Vec<u8>,
    pub initiator_eph_public_key: Vec<u8>,
    pub resumption_id: Option<Vec<u8>>,
    pub resume_mic: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSigma2 {
    pub responder_random: Vec<u8>,
    pub responder_session_id: u16,
    pub responder_eph_public_key: Vec<u8>,
    pub responder_noc: Vec<u8>,
    pub responder_icac: Option<Vec<u8>>,
    pub responder_rcac: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSigma3 {
    pub initiator_noc: Vec<u8>,
    pub initiator_icac: Option<Vec<u8>>,
    pub initiator_rcac: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStatusReport {
    pub general_code: u16,
    pub protocol_id: u32,
    pub protocol_code: u16,
}

// ---------------------------------------------------------------------------
// Interaction Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAttributePath {
    pub endpoint: Option<u16>,
    pub cluster: Option<u32>,
    pub attribute: Option<u32>,
    pub list_index: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEventPath {
    pub endpoint: Option<u16>,
    pub cluster: Option<u32>,
    pub event: Option<u32>,
    pub event_min: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDataVersionFilter {
    pub endpoint: u16,
    pub cluster: u32,
    pub data_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReadRequest {
    pub attribute_paths: Vec<WireAttributePath>,
    pub event_paths: Vec<WireEventPath>,
    pub data_version_filters: Vec<WireDataVersionFilter>,
    pub is_fabric_filtered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WireReportChunk {
    Attribute { endpoint: u16, cluster: u32, attribute: u32, data_version: u32, value: Value },
    AttributeStatus { endpoint: u16, cluster: u32, attribute: u32, status: u8 },
    Event { endpoint: u16, cluster: u32, event: u32, event_number: u64, value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReportData {
    pub chunks: Vec<WireReportChunk>,
    /// Set on a subscription's ongoing reports; absent on a plain Read's
    /// final chunk stream.
    pub subscription_id: Option<u32>,
    pub more_chunked_messages: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireListOp {
    Replace,
    Append,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAttributeData {
    pub endpoint: u16,
    pub cluster: u32,
    pub attribute: u32,
    pub value: Value,
    pub data_version: Option<u32>,
    pub list_op: WireListOp,
}

/// spec.md §4.G.3/.4: arms the `TimedInteractionGuard` for the exchange it
/// rides on; the following Write or Invoke on that same exchange must land
/// inside `timeout_ms` of this message being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTimedRequest {
    pub timeout_ms: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWriteRequest {
    pub writes: Vec<WireAttributeData>,
    pub timed: bool,
    pub suppress_response: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWriteStatus {
    pub endpoint: u16,
    pub cluster: u32,
    pub attribute: u32,
    pub status: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWriteResponse {
    pub statuses: Vec<WireWriteStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCommandData {
    pub endpoint: u16,
    pub cluster: u32,
    pub command: u32,
    pub fields: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireInvokeRequest {
    pub commands: Vec<WireCommandData>,
    pub timed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WireInvokeResponse {
    Value { endpoint: u16, cluster: u32, command: u32, value: Value },
    StatusSuccess { endpoint: u16, cluster: u32, command: u32 },
    StatusError { endpoint: u16, cluster: u32, command: u32, status: u8, cluster_status: Option<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireInvokeResponseEnvelope {
    pub responses: Vec<WireInvokeResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSubscribeRequest {
    pub min_interval_secs: u16,
    pub max_interval_secs: u16,
    pub attribute_paths: Vec<WireAttributePath>,
    pub event_paths: Vec<WireEventPath>,
    pub data_version_filters: Vec<WireDataVersionFilter>,
    pub is_fabric_filtered: bool,
    pub keep_subscriptions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSubscribeResponse {
    pub subscription_id: u32,
    pub min_interval_secs: u16,
    pub max_interval_secs: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStatusResponse {
    pub status: u8,
}

// ---------------------------------------------------------------------------
// Bulk Data eXchange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireTransferInitFlags {
    pub sender_drive: bool,
    pub receiver_drive: bool,
    pub asynchronous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSendInit {
    pub flags: WireTransferInitFlags,
    pub file_designator: String,
    pub max_block_size: u16,
    pub file_length: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReceiveInit {
    pub flags: WireTransferInitFlags,
    pub file_designator: String,
    pub max_block_size: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSendAccept {
    pub flags: WireTransferInitFlags,
    pub block_size: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReceiveAccept {
    pub flags: WireTransferInitFlags,
    pub block_size: u16,
    pub file_length: Option<u64>,
}

/// Carries both `Block` and `BlockEof` (the opcode alone distinguishes them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlock {
    pub counter: u32,
    pub data: Vec<u8>,
}

/// Carries both `BlockAck` and `BlockAckEof`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireBlockAck {
    pub counter: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireBlockQuery {
    pub counter: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireBlockQueryWithSkip {
    pub counter: u32,
    pub bytes_to_skip: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireBlockStatusReport {
    pub status: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_round_trips_through_json() {
        let request = WireReadRequest {
            attribute_paths: vec![WireAttributePath { endpoint: Some(1), cluster: Some(6), attribute: None, list_index: None }],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
        };
        let bytes = serde_json::to_vec(&request).unwrap();
        let back: WireReadRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.attribute_paths.len(), 1);
        assert_eq!(back.attribute_paths[0].cluster, Some(6));
    }

    #[test]
    fn report_chunk_variants_round_trip_with_tagged_kind() {
        let chunk = WireReportChunk::Attribute { endpoint: 1, cluster: 6, attribute: 0, data_version: 3, value: serde_json::json!(true) };
        let bytes = serde_json::to_vec(&chunk).unwrap();
        assert!(String::from_utf8(bytes.clone()).unwrap().contains("\"kind\":\"Attribute\""));
        let back: WireReportChunk = serde_json::from_slice(&bytes).unwrap();
        match back {
            WireReportChunk::Attribute { data_version, value, .. } => {
                assert_eq!(data_version, 3);
                assert_eq!(value, serde_json::json!(true));
            }
            _ => panic!("wrong variant"),
        }
    }
}
