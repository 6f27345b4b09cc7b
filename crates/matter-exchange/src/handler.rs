//! Protocol-handler registration seam (spec.md §4.F: "look up protocol
//! handler by `protocolId`"). `matter-interaction` and `matter-bdx` each
//! register one implementation per protocol id they own.

use crate::exchange::ExchangeKey;
use async_trait::async_trait;

#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// An inbound application payload addressed to `key`'s exchange. The
    /// handler owns interpreting opcodes within its protocol; MRP framing
    /// has already been stripped by the time this is called.
    async fn on_message(&self, key: ExchangeKey, opcode: u8, payload: &[u8]);

    /// The exchange's session was torn down (spec.md §3: exchanges do not
    /// outlive their session).
    async fn on_exchange_closed(&self, key: ExchangeKey);
}
