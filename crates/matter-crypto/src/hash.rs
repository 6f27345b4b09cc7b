//! SHA-256 and HMAC-SHA-256 — primitives treated as an external collaborator
//! per spec.md §1, wrapped here so callers never touch `sha2`/`hmac`
//! directly.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const SHA256_LEN: usize = 32;

/// Constant-time equality for MAC/digest comparisons (key confirmation
/// values, destination IDs, and the like) — `subtle::ConstantTimeEq`
/// rather than `==`, so a timing side channel can't narrow down a
/// forged MAC byte-by-byte. Lengths differing is itself not secret and
/// is checked up front with a plain comparison.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA-256 over one or more concatenated fragments (avoids callers
/// allocating a scratch buffer just to concatenate before hashing).
pub fn hmac_sha256(key: &[u8], fragments: &[&[u8]]) -> [u8; SHA256_LEN] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    for fragment in fragments {
        mac.update(fragment);
    }
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_over_split_fragments_matches_hmac_over_concatenation() {
        let key = b"ipk-like-key-material-16b";
        let whole = hmac_sha256(key, &[b"hello world"]);
        let split = hmac_sha256(key, &[b"hello ", b"world"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn sha256_is_deterministic_and_sensitive() {
        let a = sha256(b"abc");
        let b = sha256(b"abc");
        let c = sha256(b"abd");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ct_eq_matches_ordinary_equality_including_length_mismatch() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"different length"));
        assert!(!ct_eq(b"abcd", b"abce"));
    }
}
