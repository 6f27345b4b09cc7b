//! A single exchange's state (spec.md §3 "Exchange"): identity plus its
//! per-exchange MRP bookkeeping and cancellation token.

use matter_mrp::MrpState;
use matter_session::Session;
use matter_types::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub session: Handle<Session>,
    pub exchange_id: u16,
    pub is_initiator: bool,
}

pub struct Exchange {
    pub key: ExchangeKey,
    pub protocol_id: u16,
    pub mrp: MrpState,
    /// Child of the owning session's cancellation token (spec.md §5:
    /// "closing a node cascades abort to every owned exchange"); closing
    /// just this exchange cancels only this token, not the session's.
    pub closing: CancellationToken,
}

impl Exchange {
    pub fn new(key: ExchangeKey, protocol_id: u16, base_interval: std::time::Duration, parent: &CancellationToken) -> Self {
        Exchange { key, protocol_id, mrp: MrpState::new(base_interval), closing: parent.child_token() }
    }

    /// Exchange close (spec.md §4.C): abort outstanding retransmit timers
    /// and flush a still-pending standalone ack. Returns whether an ack
    /// flush is owed to the caller.
    pub fn close(&mut self) -> bool {
        let ack_owed = self.mrp.cancel_all();
        self.closing.cancel();
        ack_owed
    }
}
