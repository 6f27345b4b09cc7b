//! Whole-packet assembly/size enforcement (spec.md §4.A).

use crate::error::CodecError;
use crate::header::{PacketHeader, PayloadHeader};

/// UDP path MTU budget: 1280 (IPv6 minimum MTU) minus 48 bytes of IPv6+UDP
/// headers.
pub const UDP_MAX_PAYLOAD: usize = 1232;

/// TCP large-message default, used until both ends negotiate a larger
/// `maxTcpMessageSize` in session parameters.
pub const DEFAULT_TCP_MAX_MESSAGE_SIZE: usize = 64_000;

/// The channel a packet is bound for, and the size ceiling that implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLimit {
    Udp,
    Tcp { max_message_size: usize },
}

impl ChannelLimit {
    fn limit(self) -> usize {
        match self {
            ChannelLimit::Udp => UDP_MAX_PAYLOAD,
            ChannelLimit::Tcp { max_message_size } => max_message_size,
        }
    }
}

/// A fully-framed message ready to hand to a transport, or as decoded off
/// one. `payload` is ciphertext for secure sessions, plaintext for the
/// unsecured PASE/CASE handshake messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_header: PacketHeader,
    pub payload_header: PayloadHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Serialize `PacketHeader ‖ PayloadHeader ‖ payload`, refusing to
    /// produce a frame larger than `channel` allows.
    pub fn encode(&self, channel: ChannelLimit) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.packet_header.encode(&mut out);
        self.payload_header.encode(&mut out);
        out.extend_from_slice(&self.payload);
        let limit = channel.limit();
        if out.len() > limit {
            return Err(CodecError::PayloadTooLarge { len: out.len(), limit });
        }
        Ok(out)
    }

    /// Parse a frame received over `channel`, refusing oversized frames
    /// before attempting to decode them.
    pub fn decode(buf: &[u8], channel: ChannelLimit) -> Result<Self, CodecError> {
        let limit = channel.limit();
        if buf.len() > limit {
            return Err(CodecError::PayloadTooLarge { len: buf.len(), limit });
        }
        let (packet_header, rest) = PacketHeader::decode(buf)?;
        let (payload_header, payload) = PayloadHeader::decode(rest)?;
        Ok(Packet { packet_header, payload_header, payload: payload.to_vec() })
    }
}
