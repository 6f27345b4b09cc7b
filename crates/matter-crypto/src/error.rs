#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),
    #[error("AEAD seal/open failed (tampered, wrong key, or wrong nonce)")]
    AeadFailure,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("HKDF expand failed: output length too large for the hash")]
    HkdfExpand,
}
