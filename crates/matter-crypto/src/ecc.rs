//! P-256 ECDH and ECDSA wrappers, used by CASE (Sigma) handshake key
//! agreement and operational-certificate signature checks.

use crate::error::CryptoError;
use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;

/// A P-256 key pair used as an ephemeral Diffie-Hellman key (CASE Sigma1/2)
/// or as a long-lived signing identity (operational certificate key).
pub struct KeyPair {
    secret: SecretKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        KeyPair { secret: SecretKey::random(&mut OsRng) }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey("malformed P-256 scalar"))?;
        Ok(KeyPair { secret })
    }

    /// SEC1 uncompressed public point, 65 bytes (`04 || X || Y`).
    pub fn public_key_bytes(&self) -> [u8; 65] {
        let point = self.secret.public_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// ECDH shared secret (the raw X coordinate, per SEC1 §3.3.1).
    pub fn ecdh(&self, peer_public_key: &[u8]) -> Result<[u8; 32], CryptoError> {
        let peer_public = PublicKey::from_sec1_bytes(peer_public_key).map_err(|_| CryptoError::InvalidKey("peer public key not on curve"))?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::from(&self.secret);
        signing_key.sign(message)
    }
}

/// Verify an ECDSA/P-256 signature from a SEC1 public key over `message`.
pub fn verify(public_key_bytes: &[u8], message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    let public_key = PublicKey::from_sec1_bytes(public_key_bytes).map_err(|_| CryptoError::InvalidKey("malformed public key"))?;
    let verifying_key = VerifyingKey::from(&public_key);
    verifying_key.verify(message, signature).map_err(|_| CryptoError::SignatureInvalid)
}
