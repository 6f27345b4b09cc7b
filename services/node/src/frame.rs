//! Wire framing for secure and unsecured frames.
//!
//! `matter-codec::Packet` frames the unencrypted `PacketHeader` together
//! with `PayloadHeader ‖ payload` (spec.md §4.A). For a secure session the
//! payload header and the application payload are the AEAD plaintext, and
//! the packet header bytes are the AAD — this is exactly what
//! `matter-codec::header`'s module doc describes, but `Packet::encode`/
//! `decode` only cover the cleartext framing used by unsecured PASE/CASE
//! messages, so secure frames are assembled by hand here.

use crate::error::NodeError;
use matter_codec::{ChannelLimit, PacketHeader, Packet, PayloadHeader};
use matter_crypto::{open, seal};

/// Assemble a secure frame: seal `payload_header ‖ app_payload` under
/// `encrypt_key` using `packet_header`'s encoded bytes as AAD, and prepend
/// the packet header in the clear.
pub fn encode_secure(
    packet_header: &PacketHeader,
    payload_header: &PayloadHeader,
    app_payload: &[u8],
    encrypt_key: &[u8; 16],
    nonce: &[u8; 13],
) -> Result<Vec<u8>, NodeError> {
    let mut aad = Vec::new();
    packet_header.encode(&mut aad);

    let mut plaintext = Vec::new();
    payload_header.encode(&mut plaintext);
    plaintext.extend_from_slice(app_payload);

    let ciphertext = seal(encrypt_key, nonce, &aad, &plaintext)?;

    let mut out = aad;
    out.extend_from_slice(&ciphertext);
    if out.len() > matter_codec::UDP_MAX_PAYLOAD {
        return Err(NodeError::Codec(matter_codec::CodecError::PayloadTooLarge { len: out.len(), limit: matter_codec::UDP_MAX_PAYLOAD }));
    }
    Ok(out)
}

/// Parse a secure frame produced by [`encode_secure`], returning the
/// recovered header and decrypted application payload.
pub fn decode_secure(buf: &[u8], decrypt_key: &[u8; 16], nonce: &[u8; 13]) -> Result<(PacketHeader, PayloadHeader, Vec<u8>), NodeError> {
    let (packet_header, ciphertext) = PacketHeader::decode(buf)?;
    let aad_len = buf.len() - ciphertext.len();
    let aad = &buf[..aad_len];

    let plaintext = open(decrypt_key, nonce, aad, ciphertext)?;
    let (payload_header, app_payload) = PayloadHeader::decode(&plaintext)?;
    Ok((packet_header, payload_header, app_payload.to_vec()))
}

/// Encode an unsecured (session id 0) frame — used only for the PASE/CASE
/// handshake messages that precede a secure session.
pub fn encode_unsecured(packet_header: PacketHeader, payload_header: PayloadHeader, app_payload: Vec<u8>) -> Result<Vec<u8>, NodeError> {
    let packet = Packet { packet_header, payload_header, payload: app_payload };
    Ok(packet.encode(ChannelLimit::Udp)?)
}

pub fn decode_unsecured(buf: &[u8]) -> Result<Packet, NodeError> {
    Ok(Packet::decode(buf, ChannelLimit::Udp)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_codec::{NodeAddress, SecurityFlags};

    fn header(session_id: u16, message_id: u32) -> PacketHeader {
        PacketHeader {
            session_id,
            security_flags: SecurityFlags { privacy: false, control_message: false, message_extensions: false, group_session: false },
            message_id,
            source_node_id: Some(1),
            destination: Some(NodeAddress::Node(2)),
        }
    }

    fn payload_header() -> PayloadHeader {
        PayloadHeader { exchange_id: 7, protocol_id: 1, vendor_id: None, opcode: 5, is_initiator: true, requires_ack: false, acknowledged_message_id: None }
    }

    #[test]
    fn secure_frame_round_trips() {
        let key = [0x42u8; 16];
        let nonce = matter_crypto::unicast_nonce(0, 9, 2);
        let packet_header = header(100, 9);
        let wire = encode_secure(&packet_header, &payload_header(), b"hello", &key, &nonce).unwrap();
        let (decoded_header, decoded_payload_header, app_payload) = decode_secure(&wire, &key, &nonce).unwrap();
        assert_eq!(decoded_header, packet_header);
        assert_eq!(decoded_payload_header, payload_header());
        assert_eq!(app_payload, b"hello");
    }

    #[test]
    fn tampered_secure_frame_fails_to_open() {
        let key = [0x42u8; 16];
        let nonce = matter_crypto::unicast_nonce(0, 9, 2);
        let mut wire = encode_secure(&header(100, 9), &payload_header(), b"hello", &key, &nonce).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(decode_secure(&wire, &key, &nonce).is_err());
    }

    #[test]
    fn unsecured_frame_round_trips() {
        let wire = encode_unsecured(header(0, 1), payload_header(), b"plain".to_vec()).unwrap();
        let decoded = decode_unsecured(&wire).unwrap();
        assert_eq!(decoded.payload, b"plain");
    }
}
