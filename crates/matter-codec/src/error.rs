#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unsupported message format version {0}")]
    UnsupportedVersion(u8),
    #[error("payload of {len} bytes exceeds the {limit} byte limit for this channel")]
    PayloadTooLarge { len: usize, limit: usize },
    #[error("malformed security flags byte {0:#04x}")]
    MalformedSecurityFlags(u8),
}
