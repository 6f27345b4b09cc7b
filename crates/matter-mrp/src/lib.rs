//! Message Reliability Protocol: reliable ordered delivery over an
//! unreliable datagram transport (spec.md §4.C). Pure state/scheduling
//! logic; the async timer loop that drives retransmits and ack flushes
//! lives in `matter-exchange`, which owns one [`state::MrpState`] per
//! exchange.

pub mod dedup;
pub mod error;
pub mod policy;
pub mod state;

pub use dedup::DedupWindow;
pub use error::MrpError;
pub use policy::{
    peer_response_deadline, retransmit_timeout, BASE, JITTER, MARGIN, MAX_ATTEMPTS, STANDALONE_ACK_TIMEOUT,
    THRESHOLD,
};
pub use state::MrpState;
