//! `PacketHeader`/`PayloadHeader` framing (spec.md §4.A).
//!
//! A Matter message on the wire is `PacketHeader ‖ PayloadHeader ‖ Payload`.
//! The packet header is sent in the clear (it is the AAD for the AEAD tag
//! covering payload header + payload); the payload header is encrypted
//! alongside the application payload for secure sessions.

use crate::error::CodecError;

const MESSAGE_FORMAT_VERSION: u8 = 0;

/// Who the optional packet-header destination/source field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAddress {
    Node(u64),
    Group(u16),
}

/// `securityFlags`: privacy flag, control-message flag, message-extensions
/// flag, and the 2-bit session type (unicast vs group).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityFlags {
    pub privacy: bool,
    pub control_message: bool,
    pub message_extensions: bool,
    pub group_session: bool,
}

impl SecurityFlags {
    const PRIVACY_BIT: u8 = 0x80;
    const CONTROL_BIT: u8 = 0x40;
    const EXTENSIONS_BIT: u8 = 0x20;
    const SESSION_TYPE_MASK: u8 = 0x03;

    pub fn to_byte(self) -> u8 {
        let mut byte = 0u8;
        if self.privacy {
            byte |= Self::PRIVACY_BIT;
        }
        if self.control_message {
            byte |= Self::CONTROL_BIT;
        }
        if self.message_extensions {
            byte |= Self::EXTENSIONS_BIT;
        }
        if self.group_session {
            byte |= 0x01;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        let session_type = byte & Self::SESSION_TYPE_MASK;
        if session_type > 1 {
            return Err(CodecError::MalformedSecurityFlags(byte));
        }
        Ok(SecurityFlags {
            privacy: byte & Self::PRIVACY_BIT != 0,
            control_message: byte & Self::CONTROL_BIT != 0,
            message_extensions: byte & Self::EXTENSIONS_BIT != 0,
            group_session: session_type == 1,
        })
    }
}

/// The unencrypted packet header: session routing plus the replay counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub session_id: u16,
    pub security_flags: SecurityFlags,
    pub message_id: u32,
    pub source_node_id: Option<u64>,
    pub destination: Option<NodeAddress>,
}

impl PacketHeader {
    /// Bit 2 of `messageFlags`: source node id present.
    const SOURCE_PRESENT_BIT: u8 = 0x04;
    /// Bits 0-1 of `messageFlags`: destination size, `0`=none `1`=node `2`=group.
    const DEST_NODE: u8 = 0x01;
    const DEST_GROUP: u8 = 0x02;

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut message_flags = MESSAGE_FORMAT_VERSION << 4;
        if self.source_node_id.is_some() {
            message_flags |= Self::SOURCE_PRESENT_BIT;
        }
        message_flags |= match self.destination {
            None => 0,
            Some(NodeAddress::Node(_)) => Self::DEST_NODE,
            Some(NodeAddress::Group(_)) => Self::DEST_GROUP,
        };
        out.push(message_flags);
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.push(self.security_flags.to_byte());
        out.extend_from_slice(&self.message_id.to_le_bytes());
        if let Some(source) = self.source_node_id {
            out.extend_from_slice(&source.to_le_bytes());
        }
        match self.destination {
            None => {}
            Some(NodeAddress::Node(node_id)) => out.extend_from_slice(&node_id.to_le_bytes()),
            Some(NodeAddress::Group(group_id)) => out.extend_from_slice(&group_id.to_le_bytes()),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        require(buf, 8)?;
        let message_flags = buf[0];
        let version = message_flags >> 4;
        if version != MESSAGE_FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let session_id = u16::from_le_bytes([buf[1], buf[2]]);
        let security_flags = SecurityFlags::from_byte(buf[3])?;
        let message_id = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut rest = &buf[8..];

        let source_node_id = if message_flags & Self::SOURCE_PRESENT_BIT != 0 {
            require(rest, 8)?;
            let (id_bytes, tail) = rest.split_at(8);
            rest = tail;
            Some(u64::from_le_bytes(id_bytes.try_into().expect("split_at(8)")))
        } else {
            None
        };

        let destination = match message_flags & 0x03 {
            0 => None,
            Self::DEST_NODE => {
                require(rest, 8)?;
                let (id_bytes, tail) = rest.split_at(8);
                rest = tail;
                Some(NodeAddress::Node(u64::from_le_bytes(id_bytes.try_into().expect("split_at(8)"))))
            }
            Self::DEST_GROUP => {
                require(rest, 2)?;
                let (id_bytes, tail) = rest.split_at(2);
                rest = tail;
                Some(NodeAddress::Group(u16::from_le_bytes(id_bytes.try_into().expect("split_at(2)"))))
            }
            _ => None,
        };

        Ok((
            PacketHeader { session_id, security_flags, message_id, source_node_id, destination },
            rest,
        ))
    }
}

/// The (possibly-encrypted) payload header: exchange routing and MRP bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    pub exchange_id: u16,
    pub protocol_id: u16,
    pub vendor_id: Option<u16>,
    pub opcode: u8,
    pub is_initiator: bool,
    pub requires_ack: bool,
    pub acknowledged_message_id: Option<u32>,
}

impl PayloadHeader {
    const INITIATOR_BIT: u8 = 0x01;
    const ACK_PRESENT_BIT: u8 = 0x02;
    const REQUIRES_ACK_BIT: u8 = 0x04;
    const VENDOR_PRESENT_BIT: u8 = 0x10;

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut exchange_flags = 0u8;
        if self.is_initiator {
            exchange_flags |= Self::INITIATOR_BIT;
        }
        if self.acknowledged_message_id.is_some() {
            exchange_flags |= Self::ACK_PRESENT_BIT;
        }
        if self.requires_ack {
            exchange_flags |= Self::REQUIRES_ACK_BIT;
        }
        if self.vendor_id.is_some() {
            exchange_flags |= Self::VENDOR_PRESENT_BIT;
        }
        out.push(exchange_flags);
        out.push(self.opcode);
        out.extend_from_slice(&self.exchange_id.to_le_bytes());
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        if let Some(vendor_id) = self.vendor_id {
            out.extend_from_slice(&vendor_id.to_le_bytes());
        }
        if let Some(ack) = self.acknowledged_message_id {
            out.extend_from_slice(&ack.to_le_bytes());
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        require(buf, 6)?;
        let exchange_flags = buf[0];
        let opcode = buf[1];
        let exchange_id = u16::from_le_bytes([buf[2], buf[3]]);
        let protocol_id = u16::from_le_bytes([buf[4], buf[5]]);
        let mut rest = &buf[6..];

        let vendor_id = if exchange_flags & Self::VENDOR_PRESENT_BIT != 0 {
            require(rest, 2)?;
            let (bytes, tail) = rest.split_at(2);
            rest = tail;
            Some(u16::from_le_bytes(bytes.try_into().expect("split_at(2)")))
        } else {
            None
        };

        let acknowledged_message_id = if exchange_flags & Self::ACK_PRESENT_BIT != 0 {
            require(rest, 4)?;
            let (bytes, tail) = rest.split_at(4);
            rest = tail;
            Some(u32::from_le_bytes(bytes.try_into().expect("split_at(4)")))
        } else {
            None
        };

        Ok((
            PayloadHeader {
                exchange_id,
                protocol_id,
                vendor_id,
                opcode,
                is_initiator: exchange_flags & Self::INITIATOR_BIT != 0,
                requires_ack: exchange_flags & Self::REQUIRES_ACK_BIT != 0,
                acknowledged_message_id,
            },
            rest,
        ))
    }
}

fn require(buf: &[u8], need: usize) -> Result<(), CodecError> {
    if buf.len() < need {
        Err(CodecError::Truncated { need, have: buf.len() })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet_header() -> PacketHeader {
        PacketHeader {
            session_id: 42,
            security_flags: SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false },
            message_id: 0xdead_beef,
            source_node_id: Some(0x1122_3344_5566_7788),
            destination: Some(NodeAddress::Node(0x99aa_bbcc_ddee_ff00)),
        }
    }

    #[test]
    fn packet_header_round_trips_with_source_and_node_destination() {
        let header = sample_packet_header();
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let (decoded, rest) = PacketHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn packet_header_round_trips_with_group_destination_and_no_source() {
        let header = PacketHeader {
            session_id: 7,
            security_flags: SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: true },
            message_id: 1,
            source_node_id: None,
            destination: Some(NodeAddress::Group(0x2222)),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let (decoded, rest) = PacketHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn packet_header_decode_rejects_truncated_buffer() {
        let header = sample_packet_header();
        let mut buf = Vec::new();
        header.encode(&mut buf);
        buf.truncate(buf.len() - 1);
        assert!(matches!(PacketHeader::decode(&buf), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn payload_header_round_trips_with_vendor_id_and_ack() {
        let header = PayloadHeader {
            exchange_id: 99,
            protocol_id: 1,
            vendor_id: Some(0xfff1),
            opcode: 5,
            is_initiator: true,
            requires_ack: true,
            acknowledged_message_id: Some(77),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let (decoded, rest) = PayloadHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn payload_header_round_trips_without_optional_fields() {
        let header = PayloadHeader {
            exchange_id: 1,
            protocol_id: 0,
            vendor_id: None,
            opcode: 0,
            is_initiator: false,
            requires_ack: false,
            acknowledged_message_id: None,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let (decoded, rest) = PayloadHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }
}
