use matter_codec::CodecError;
use matter_crypto::CryptoError;
use matter_exchange::ExchangeError;
use matter_fabric::FabricError;
use matter_session::SessionError;
use matter_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("received frame for unknown local session id {0}")]
    UnknownSession(u16),
    #[error("received frame on an unregistered protocol {0}")]
    UnknownProtocol(u16),
    #[error("malformed application message: {0}")]
    MalformedMessage(String),
}
