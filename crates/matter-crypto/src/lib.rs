//! The *Crypto* collaborator (spec.md §1): thin, well-tested wrappers
//! around SHA-256/HMAC, HKDF, AES-CCM AEAD, and P-256 ECDH/ECDSA/SPAKE2+,
//! plus the three concrete derivations named in spec.md §6 (IPK,
//! compressed fabric ID, destination ID). Callers elsewhere in the
//! workspace never reach for `sha2`/`hmac`/`p256`/`ccm` directly.

pub mod aead;
pub mod ecc;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod spake2plus;

pub use aead::{group_nonce, open, seal, unicast_nonce, NONCE_LEN, TAG_LEN};
pub use ecc::{verify, KeyPair};
pub use error::CryptoError;
pub use hash::{ct_eq, hmac_sha256, sha256, SHA256_LEN};
pub use kdf::{derive_compressed_fabric_id, derive_ipk, destination_id, hkdf_sha256};
