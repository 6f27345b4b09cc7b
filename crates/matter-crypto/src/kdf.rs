//! HKDF-SHA-256 key schedule helpers: the generic primitive plus the three
//! concrete derivations named in spec.md §6 (IPK, compressed fabric ID,
//! destination ID).

use crate::error::CryptoError;
use crate::hash::hmac_sha256;
use hkdf::Hkdf;
use sha2::Sha256;

/// `HKDF-Expand(HKDF-Extract(salt, ikm), info, length)`.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm).map_err(|_| CryptoError::HkdfExpand)?;
    Ok(okm)
}

/// Per-fabric Identity Protection Key: `HKDF(epochKey, fabricId, "GroupKey v1.0", 16)`.
pub fn derive_ipk(epoch_key: &[u8], fabric_id: u64) -> Result<[u8; 16], CryptoError> {
    let okm = hkdf_sha256(epoch_key, &fabric_id.to_be_bytes(), b"GroupKey v1.0", 16)?;
    Ok(okm.try_into().expect("length fixed at 16 above"))
}

/// `compressedFabricId = HKDF(rootPub, fabricId, "CompressedFabric", 8)`.
pub fn derive_compressed_fabric_id(root_public_key: &[u8], fabric_id: u64) -> Result<[u8; 8], CryptoError> {
    let okm = hkdf_sha256(root_public_key, &fabric_id.to_be_bytes(), b"CompressedFabric", 8)?;
    Ok(okm.try_into().expect("length fixed at 8 above"))
}

/// `DestinationID = HMAC-SHA256(IPK, random32 ‖ rootPublicKey ‖ fabricId ‖ destNodeId)`.
pub fn destination_id(ipk: &[u8; 16], random: &[u8; 32], root_public_key: &[u8], fabric_id: u64, dest_node_id: u64) -> [u8; 32] {
    hmac_sha256(
        ipk,
        &[random, root_public_key, &fabric_id.to_be_bytes(), &dest_node_id.to_be_bytes()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256 as Sha256Digest;

    #[test]
    fn derivations_are_deterministic() {
        let epoch_key = [0x11u8; 16];
        let ipk1 = derive_ipk(&epoch_key, 0x2906c908d115d362).unwrap();
        let ipk2 = derive_ipk(&epoch_key, 0x2906c908d115d362).unwrap();
        assert_eq!(ipk1, ipk2);
        assert_ne!(ipk1, [0u8; 16]);
    }

    #[test]
    fn compressed_fabric_id_changes_with_root_key_or_fabric_id() {
        let root_a = [0xABu8; 65];
        let root_b = [0xACu8; 65];
        let a = derive_compressed_fabric_id(&root_a, 1).unwrap();
        let b = derive_compressed_fabric_id(&root_b, 1).unwrap();
        let c = derive_compressed_fabric_id(&root_a, 2).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    /// Testable property #4 (spec.md §8): the three concrete source vectors
    /// are given with elided (`…`) hex, so they cannot be reproduced
    /// byte-for-byte (see DESIGN.md). Instead we check determinism,
    /// sensitivity to each input, and cross-validate against an
    /// independently-constructed HMAC-SHA-256 call using the same inputs
    /// assembled a different way (one `update()` per field instead of one
    /// contiguous buffer), which would disagree if the concatenation order
    /// in `destination_id` were wrong.
    #[test]
    fn destination_id_matches_independent_hmac_construction_and_is_input_sensitive() {
        let ipk = [0x9bu8; 16];
        let random = [0x7eu8; 32];
        let root_pub = [0x04u8; 65];
        let fabric_id = 0x2906c908d115d362u64;
        let node_id = 0x9u64;

        let a = destination_id(&ipk, &random, &root_pub, fabric_id, node_id);
        let b = destination_id(&ipk, &random, &root_pub, fabric_id, node_id);
        assert_eq!(a, b, "destination ID must be deterministic");

        let mut mac = <Hmac<Sha256Digest> as Mac>::new_from_slice(&ipk).unwrap();
        mac.update(&random);
        mac.update(&root_pub);
        mac.update(&fabric_id.to_be_bytes());
        mac.update(&node_id.to_be_bytes());
        let independent: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(a, independent, "must match HMAC-SHA256(IPK, random || rootPub || fabricId || nodeId)");

        let different_node = destination_id(&ipk, &random, &root_pub, fabric_id, node_id + 1);
        assert_ne!(a, different_node);
        let different_random = destination_id(&ipk, &[0x14u8; 32], &root_pub, fabric_id, node_id);
        assert_ne!(a, different_random);
    }
}
