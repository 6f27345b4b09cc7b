//! Exchange Multiplex (spec.md §4.F): short-lived conversations
//! multiplexed over a session, dispatched by `protocolId`.

pub mod error;
pub mod exchange;
pub mod handler;
pub mod manager;

pub use error::ExchangeError;
pub use exchange::{Exchange, ExchangeKey};
pub use handler::ProtocolHandler;
pub use manager::{ExchangeManager, MAX_INFLIGHT_PER_SESSION, OUTBOUND_QUEUE_TIMEOUT};
