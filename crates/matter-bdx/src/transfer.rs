//! BDX transfer state machine (spec.md §4.J): negotiation, strictly
//! monotonic block counters, and the four driven/following flows.

use crate::error::BdxError;
use crate::message::{BdxStatusCode, TransferInitFlags};
use crate::role::FlowRole;
use tracing::{info, warn};

/// `"the transfer's `TransferState` enum (`Idle → Negotiating →
/// Transferring → Completed/Aborted`)"` (SPEC_FULL §4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Negotiating,
    Transferring,
    Completed,
    Aborted,
}

/// One BDX block transfer bound to an exchange. Owns the negotiated
/// block size and the monotonic counter; does not own the file bytes
/// (the caller streams chunks in and out through `next_outbound`/`on_block`).
pub struct Transfer {
    state: TransferState,
    role: FlowRole,
    flags: TransferInitFlags,
    block_size: u16,
    transport_max: u16,
    file_length: Option<u64>,
    next_counter: u32,
    bytes_transferred: u64,
}

impl Transfer {
    /// Begin negotiation. `proposed_block_size` is this side's ask;
    /// `transport_max` bounds what can ever be accepted (spec.md §4.J:
    /// "Chunk size is negotiated in accept messages (≤ transport max)").
    pub fn negotiate(
        role: FlowRole,
        flags: TransferInitFlags,
        proposed_block_size: u16,
        transport_max: u16,
        file_length: Option<u64>,
    ) -> Result<Self, BdxError> {
        if proposed_block_size > transport_max {
            return Err(BdxError::BlockSizeExceedsTransportMax { requested: proposed_block_size, max: transport_max });
        }
        Ok(Transfer {
            state: TransferState::Negotiating,
            role,
            flags,
            block_size: proposed_block_size,
            transport_max,
            file_length,
            next_counter: 0,
            bytes_transferred: 0,
        })
    }

    /// Accept the peer's counter-proposed block size, clamped by the
    /// transport ceiling this side already committed to.
    pub fn accept(&mut self, accepted_block_size: u16) -> Result<(), BdxError> {
        if accepted_block_size > self.transport_max {
            return Err(BdxError::BlockSizeExceedsTransportMax { requested: accepted_block_size, max: self.transport_max });
        }
        self.block_size = accepted_block_size;
        self.state = TransferState::Transferring;
        info!(block_size = self.block_size, role = ?self.role, "bdx transfer negotiated");
        Ok(())
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn role(&self) -> FlowRole {
        self.role
    }

    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    pub fn file_length(&self) -> Option<u64> {
        self.file_length
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Validate an incoming block/ack/query counter against the next
    /// expected value (spec.md §4.J: "Counter `n` must be strictly
    /// monotonic; a mismatch is a fatal `UnexpectedBlockCounter` status").
    pub fn check_counter(&self, got: u32) -> Result<(), BdxError> {
        if got != self.next_counter {
            return Err(BdxError::UnexpectedBlockCounter { expected: self.next_counter, got });
        }
        Ok(())
    }

    /// Record a `Block`/`BlockEof` delivered at the expected counter and
    /// advance it. Returns `true` if this was the final (`eof`) block.
    pub fn on_block_received(&mut self, counter: u32, payload_len: usize, eof: bool) -> Result<bool, BdxError> {
        if self.state != TransferState::Transferring {
            return Err(BdxError::UnexpectedMessage);
        }
        self.check_counter(counter)?;
        self.next_counter = self.next_counter.wrapping_add(1);
        self.bytes_transferred += payload_len as u64;
        if eof {
            self.state = TransferState::Completed;
            info!(bytes = self.bytes_transferred, "bdx transfer completed");
        }
        Ok(eof)
    }

    /// Consumed by the driving side to mint the next `BlockQuery`/
    /// `BlockQueryWithSkip` counter without advancing state (the
    /// counter only advances once the corresponding block arrives).
    pub fn pending_query_counter(&self) -> u32 {
        self.next_counter
    }

    /// Record a `Block`/`BlockEof` this side just sent at the expected
    /// counter and advance it. The sending-side mirror of
    /// [`Self::on_block_received`]: a `DrivenSending`/`FollowingSending`
    /// transfer has nothing analogous to "receive a block" to drive its
    /// counter and byte total, so the side pushing data out advances them
    /// here instead, at the point it commits to having sent `counter`.
    pub fn on_block_sent(&mut self, counter: u32, payload_len: usize, eof: bool) -> Result<bool, BdxError> {
        if self.state != TransferState::Transferring {
            return Err(BdxError::UnexpectedMessage);
        }
        self.check_counter(counter)?;
        self.next_counter = self.next_counter.wrapping_add(1);
        self.bytes_transferred += payload_len as u64;
        if eof {
            self.state = TransferState::Completed;
            info!(bytes = self.bytes_transferred, "bdx transfer completed");
        }
        Ok(eof)
    }

    /// Abort locally (peer status report or exchange closed). Idempotent.
    pub fn abort(&mut self, status: BdxStatusCode) {
        if matches!(self.state, TransferState::Completed | TransferState::Aborted) {
            return;
        }
        warn!(?status, bytes = self.bytes_transferred, "bdx transfer aborted");
        self.state = TransferState::Aborted;
    }

    /// Exchange closed underneath the transfer (spec.md §4.J:
    /// "Cancellation: closing the exchange terminates the local stream
    /// with error; partial receivers discard the file").
    pub fn on_exchange_closed(&mut self) -> Result<(), BdxError> {
        let was_incomplete = !matches!(self.state, TransferState::Completed);
        self.abort(BdxStatusCode::TransferFailedUnknownError);
        if was_incomplete && self.role.direction() == crate::role::Direction::Receiving {
            warn!(bytes = self.bytes_transferred, "discarding partially received file");
        }
        if was_incomplete {
            return Err(BdxError::ExchangeClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::derive_flow_role;

    fn flags() -> TransferInitFlags {
        TransferInitFlags { sender_drive: false, receiver_drive: true, asynchronous: false }
    }

    #[test]
    fn negotiation_rejects_block_size_above_transport_max() {
        let err = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 2000, 1024, None).unwrap_err();
        assert!(matches!(err, BdxError::BlockSizeExceedsTransportMax { .. }));
    }

    #[test]
    fn accept_moves_to_transferring() {
        let mut t = Transfer::negotiate(derive_flow_role(false, flags()), flags(), 1024, 1024, Some(512_000)).unwrap();
        assert_eq!(t.state(), TransferState::Negotiating);
        t.accept(1024).unwrap();
        assert_eq!(t.state(), TransferState::Transferring);
    }

    #[test]
    fn receiver_drive_example_walks_query_block_ackeof() {
        // DrivingReceiving: receiver issues BlockQuery(n), sender answers
        // Block(n)/BlockEof(n); receiver writes and advances, then acks.
        let mut t = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 256, 1024, Some(3)).unwrap();
        t.accept(256).unwrap();
        assert_eq!(t.pending_query_counter(), 0);
        let eof = t.on_block_received(0, 3, true).unwrap();
        assert!(eof);
        assert_eq!(t.state(), TransferState::Completed);
        assert_eq!(t.bytes_transferred(), 3);
    }

    #[test]
    fn driven_sending_example_walks_query_block_via_on_block_sent() {
        // DrivenSending: peer issues BlockQuery(n), we answer with
        // Block(n)/BlockEof(n) and advance our own counter via on_block_sent
        // since nothing arrives on this side to drive it.
        let mut t = Transfer::negotiate(FlowRole::DrivenSending, flags(), 4, 1024, Some(4)).unwrap();
        t.accept(4).unwrap();
        assert_eq!(t.pending_query_counter(), 0);
        let eof = t.on_block_sent(0, 4, true).unwrap();
        assert!(eof);
        assert_eq!(t.state(), TransferState::Completed);
        assert_eq!(t.bytes_transferred(), 4);
    }

    #[test]
    fn sent_block_out_of_order_counter_is_a_fatal_mismatch() {
        let mut t = Transfer::negotiate(FlowRole::DrivenSending, flags(), 256, 1024, None).unwrap();
        t.accept(256).unwrap();
        let err = t.on_block_sent(1, 10, false).unwrap_err();
        assert!(matches!(err, BdxError::UnexpectedBlockCounter { expected: 0, got: 1 }));
    }

    #[test]
    fn out_of_order_counter_is_a_fatal_mismatch() {
        let mut t = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 256, 1024, None).unwrap();
        t.accept(256).unwrap();
        let err = t.on_block_received(1, 10, false).unwrap_err();
        assert!(matches!(err, BdxError::UnexpectedBlockCounter { expected: 0, got: 1 }));
    }

    #[test]
    fn exchange_close_mid_transfer_discards_and_errors() {
        let mut t = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 256, 1024, Some(10)).unwrap();
        t.accept(256).unwrap();
        t.on_block_received(0, 5, false).unwrap();
        let err = t.on_exchange_closed().unwrap_err();
        assert!(matches!(err, BdxError::ExchangeClosed));
        assert_eq!(t.state(), TransferState::Aborted);
    }

    #[test]
    fn exchange_close_after_completion_is_a_no_op() {
        let mut t = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 256, 1024, Some(1)).unwrap();
        t.accept(256).unwrap();
        t.on_block_received(0, 1, true).unwrap();
        assert!(t.on_exchange_closed().is_ok());
        assert_eq!(t.state(), TransferState::Completed);
    }

    #[test]
    fn abort_is_idempotent() {
        let mut t = Transfer::negotiate(FlowRole::DrivingReceiving, flags(), 256, 1024, None).unwrap();
        t.abort(BdxStatusCode::ResponderBusy);
        t.abort(BdxStatusCode::Overflow);
        assert_eq!(t.state(), TransferState::Aborted);
    }
}
