#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("crypto failure: {0}")]
    Crypto(#[from] matter_crypto::CryptoError),
    #[error("unexpected message in handshake state {state}")]
    UnexpectedMessage { state: &'static str },
    #[error("PASE pairing window timed out after 60s")]
    PairingTimeout,
    #[error("PASE commissioning window closed: too many errors ({count})")]
    TooManyErrors { count: u32 },
    #[error("another PASE handshake is already in flight")]
    PaseAlreadyInFlight,
    #[error("key confirmation failed")]
    KeyConfirmationFailed,
    #[error("certificate chain validation failed: {0}")]
    CertChainInvalid(&'static str),
    #[error("destination ID did not match any joined fabric")]
    DestinationIdNotFound,
    #[error("no session with local session id {0}")]
    UnknownLocalSessionId(u16),
    #[error("no resumption record for resumption id")]
    ResumptionNotFound,
    #[error("group key not found for (groupId={group_id}, sessionId={session_id})")]
    GroupKeyNotFound { group_id: u16, session_id: u16 },
}
