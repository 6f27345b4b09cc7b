#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MrpError {
    #[error("no MRP state for message id {0:#010x}")]
    UnknownMessageId(u32),
    #[error("retransmit budget exhausted after {attempts} attempts")]
    MaxRetransmit { attempts: u8 },
}
