#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("fabric index {0} not found")]
    NotFound(u8),
    #[error("fabric index {0} is already in use")]
    IndexInUse(u8),
    #[error("no free fabric index remains (all 254 slots in use)")]
    IndexSpaceExhausted,
    #[error("tuple (rootPublicKey, fabricId) already joined as fabric index {existing}")]
    DuplicateRootAndFabricId { existing: u8 },
    #[error("crypto derivation failed: {0}")]
    Crypto(#[from] matter_crypto::CryptoError),
    #[error("store error: {0}")]
    Store(String),
}
