#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("exchange id {exchange_id} already in use for this session/direction")]
    DuplicateExchange { exchange_id: u16 },
    #[error("no exchange {exchange_id} (initiator={is_initiator}) on this session")]
    UnknownExchange { exchange_id: u16, is_initiator: bool },
    #[error("no protocol handler registered for protocol id {0}")]
    UnknownProtocol(u16),
    #[error("exchange concurrency budget exhausted and FIFO queue wait timed out")]
    QueueTimeout,
    #[error("mrp error: {0}")]
    Mrp(#[from] matter_mrp::MrpError),
}
