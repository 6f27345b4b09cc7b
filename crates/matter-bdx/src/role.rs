//! Flow-role derivation from init flags (spec.md §4.J): "Roles at session
//! setup from init flags: (Sender vs Receiver) × (Driver vs Follower) ×
//! (Sync vs Async), producing four flows: DrivenSending, DrivingReceiving,
//! FollowingSending, FollowingReceiving."

use crate::message::TransferInitFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sending,
    Receiving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRole {
    /// We are the Sender; the peer drives block movement with `BlockQuery`.
    DrivenSending,
    /// We are the Receiver and drive block movement ourselves.
    DrivingReceiving,
    /// We are the Sender and push blocks unprompted (sender-drive).
    FollowingSending,
    /// We are the Receiver and simply ack blocks pushed to us (sender-drive).
    FollowingReceiving,
}

impl FlowRole {
    pub fn direction(self) -> Direction {
        match self {
            FlowRole::DrivenSending | FlowRole::FollowingSending => Direction::Sending,
            FlowRole::DrivingReceiving | FlowRole::FollowingReceiving => Direction::Receiving,
        }
    }

    /// `true` if this side is expected to send `BlockQuery`/`BlockQueryWithSkip`.
    pub fn drives(self) -> bool {
        matches!(self, FlowRole::DrivingReceiving)
    }
}

/// Derive this node's flow role given whether it proposed the transfer as
/// Sender or Receiver and the negotiated init flags.
pub fn derive_flow_role(we_are_sender: bool, flags: TransferInitFlags) -> FlowRole {
    match (we_are_sender, flags.receiver_drive) {
        (true, true) => FlowRole::DrivenSending,
        (false, true) => FlowRole::DrivingReceiving,
        (true, false) => FlowRole::FollowingSending,
        (false, false) => FlowRole::FollowingReceiving,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(receiver_drive: bool) -> TransferInitFlags {
        TransferInitFlags { sender_drive: !receiver_drive, receiver_drive, asynchronous: false }
    }

    #[test]
    fn receiver_drive_produces_the_documented_driving_receiving_example() {
        assert_eq!(derive_flow_role(false, flags(true)), FlowRole::DrivingReceiving);
        assert_eq!(derive_flow_role(true, flags(true)), FlowRole::DrivenSending);
    }

    #[test]
    fn sender_drive_produces_the_following_pair() {
        assert_eq!(derive_flow_role(true, flags(false)), FlowRole::FollowingSending);
        assert_eq!(derive_flow_role(false, flags(false)), FlowRole::FollowingReceiving);
    }

    #[test]
    fn only_driving_receiving_is_expected_to_send_block_query() {
        assert!(derive_flow_role(false, flags(true)).drives());
        assert!(!derive_flow_role(true, flags(true)).drives());
        assert!(!derive_flow_role(true, flags(false)).drives());
        assert!(!derive_flow_role(false, flags(false)).drives());
    }
}
