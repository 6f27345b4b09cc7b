#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    BindFailed(std::io::Error),
    #[error("send failed: {0}")]
    SendFailed(std::io::Error),
    #[error("no transport in the set supports {0}")]
    Unsupported(std::net::SocketAddr),
    #[error("transport already closed")]
    Closed,
}
