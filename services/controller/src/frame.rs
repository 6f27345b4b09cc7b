//! Wire framing for secure and unsecured frames — the commissioner-side
//! counterpart to `services/node`'s `frame` module. Same AAD/plaintext
//! layout (`matter-codec::header`'s module doc): the packet header is the
//! AEAD's AAD, `PayloadHeader ‖ payload` is the plaintext.

use crate::error::ControllerError;
use matter_codec::{ChannelLimit, Packet, PacketHeader, PayloadHeader};
use matter_crypto::{open, seal};

pub fn encode_secure(
    packet_header: &PacketHeader,
    payload_header: &PayloadHeader,
    app_payload: &[u8],
    encrypt_key: &[u8; 16],
    nonce: &[u8; 13],
) -> Result<Vec<u8>, ControllerError> {
    let mut aad = Vec::new();
    packet_header.encode(&mut aad);

    let mut plaintext = Vec::new();
    payload_header.encode(&mut plaintext);
    plaintext.extend_from_slice(app_payload);

    let ciphertext = seal(encrypt_key, nonce, &aad, &plaintext)?;

    let mut out = aad;
    out.extend_from_slice(&ciphertext);
    if out.len() > matter_codec::UDP_MAX_PAYLOAD {
        return Err(ControllerError::Codec(matter_codec::CodecError::PayloadTooLarge { len: out.len(), limit: matter_codec::UDP_MAX_PAYLOAD }));
    }
    Ok(out)
}

pub fn decode_secure(buf: &[u8], decrypt_key: &[u8; 16], nonce: &[u8; 13]) -> Result<(PacketHeader, PayloadHeader, Vec<u8>), ControllerError> {
    let (packet_header, ciphertext) = PacketHeader::decode(buf)?;
    let aad_len = buf.len() - ciphertext.len();
    let aad = &buf[..aad_len];

    let plaintext = open(decrypt_key, nonce, aad, ciphertext)?;
    let (payload_header, app_payload) = PayloadHeader::decode(&plaintext)?;
    Ok((packet_header, payload_header, app_payload.to_vec()))
}

pub fn encode_unsecured(packet_header: PacketHeader, payload_header: PayloadHeader, app_payload: Vec<u8>) -> Result<Vec<u8>, ControllerError> {
    let packet = Packet { packet_header, payload_header, payload: app_payload };
    Ok(packet.encode(ChannelLimit::Udp)?)
}

pub fn decode_unsecured(buf: &[u8]) -> Result<Packet, ControllerError> {
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
    fn unsecured_frame_round_trips() {
        let wire = encode_unsecured(header(0, 1), payload_header(), b"plain".to_vec()).unwrap();
        let decoded = decode_unsecured(&wire).unwrap();
        assert_eq!(decoded.payload, b"plain");
    }
}
