use matter_codec::CodecError;
use matter_crypto::CryptoError;
use matter_session::SessionError;
use matter_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("timed out waiting for a reply from the node")]
    Timeout,
    #[error("node closed the connection")]
    TransportClosed,
    #[error("malformed application message: {0}")]
    MalformedMessage(String),
    #[error("node rejected the request: {0}")]
    Rejected(String),
}
