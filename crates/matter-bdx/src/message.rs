//! BDX wire message shapes (spec.md §4.J).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferInitFlags {
    pub sender_drive: bool,
    pub receiver_drive: bool,
    pub asynchronous: bool,
}

#[derive(Debug, Clone)]
pub struct SendInit {
    pub flags: TransferInitFlags,
    pub file_designator: String,
    pub max_block_size: u16,
    pub file_length: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ReceiveInit {
    pub flags: TransferInitFlags,
    pub file_designator: String,
    pub max_block_size: u16,
}

#[derive(Debug, Clone)]
pub struct SendAccept {
    pub flags: TransferInitFlags,
    pub block_size: u16,
}

#[derive(Debug, Clone)]
pub struct ReceiveAccept {
    pub flags: TransferInitFlags,
    pub block_size: u16,
    pub file_length: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub counter: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BlockEof {
    pub counter: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockAck {
    pub counter: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockAckEof {
    pub counter: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockQuery {
    pub counter: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockQueryWithSkip {
    pub counter: u32,
    pub bytes_to_skip: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdxStatusCode {
    Overflow,
    LengthTooLarge,
    LengthRequired,
    BadMessageContents,
    UnexpectedBlockCounter,
    ResponderBusy,
    TransferFailedUnknownError,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockStatusReport {
    pub status: BdxStatusCode,
}

#[derive(Debug, Clone)]
pub enum BdxMessage {
    SendInit(SendInit),
    ReceiveInit(ReceiveInit),
    SendAccept(SendAccept),
    ReceiveAccept(ReceiveAccept),
    Block(Block),
    BlockEof(BlockEof),
    BlockAck(BlockAck),
    BlockAckEof(BlockAckEof),
    BlockQuery(BlockQuery),
    BlockQueryWithSkip(BlockQueryWithSkip),
    BlockStatusReport(BlockStatusReport),
}
