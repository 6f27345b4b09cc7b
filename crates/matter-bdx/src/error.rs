#[derive(Debug, thiserror::Error)]
pub enum BdxError {
    #[error("block counter {got} is not the expected successor of {expected}")]
    UnexpectedBlockCounter { expected: u32, got: u32 },
    #[error("requested block size {requested} exceeds transport maximum {max}")]
    BlockSizeExceedsTransportMax { requested: u16, max: u16 },
    #[error("transfer is not in a state that accepts this message")]
    UnexpectedMessage,
    #[error("exchange closed, transfer aborted")]
    ExchangeClosed,
    #[error("peer reported status: {0:?}")]
    PeerStatus(crate::message::BdxStatusCode),
}
