//! Bulk Data eXchange (spec.md §4.J): the asynchronous file-transfer
//! protocol used for OTA, with SenderDrive/ReceiverDrive role variants
//! layered over a strictly-monotonic block counter.

pub mod error;
pub mod message;
pub mod role;
pub mod transfer;

pub use error::BdxError;
pub use message::{
    Block, BlockAck, BlockAckEof, BlockEof, BlockQuery, BlockQueryWithSkip, BlockStatusReport,
    BdxMessage, BdxStatusCode, ReceiveAccept, ReceiveInit, SendAccept, SendInit, TransferInitFlags,
};
pub use role::{derive_flow_role, Direction, FlowRole};
pub use transfer::{Transfer, TransferState};
