//! `ExchangeManager` (spec.md §4.F): inbound dispatch by `protocolId`,
//! outbound `exchangeId` allocation, and the per-session in-flight budget.

use crate::error::ExchangeError;
use crate::exchange::{Exchange, ExchangeKey};
use crate::handler::ProtocolHandler;
use matter_session::Session;
use matter_types::Handle;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// spec.md §4.F: "a reasonable cap of in-flight exchanges per session
/// (e.g., 5)".
pub const MAX_INFLIGHT_PER_SESSION: usize = 5;
/// How long an outbound caller waits in the FIFO queue once the budget is
/// exhausted before giving up (spec.md §4.F: "queued FIFO with a
/// per-request timeout").
pub const OUTBOUND_QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

struct LiveExchange {
    exchange: Exchange,
    /// Held only for outbound exchanges this node initiated; released
    /// (freeing a budget slot) when the exchange closes.
    _permit: Option<OwnedSemaphorePermit>,
}

#[derive(Default)]
pub struct ExchangeManager {
    exchanges: RwLock<HashMap<ExchangeKey, LiveExchange>>,
    handlers: RwLock<HashMap<u16, Arc<dyn ProtocolHandler>>>,
    budgets: RwLock<HashMap<Handle<Session>, Arc<Semaphore>>>,
    next_outbound_id: RwLock<HashMap<Handle<Session>, u16>>,
}

impl ExchangeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_protocol(&self, protocol_id: u16, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.write().expect("lock poisoned").insert(protocol_id, handler);
    }

    fn budget_for(&self, session: Handle<Session>) -> Arc<Semaphore> {
        self.budgets
            .write()
            .expect("lock poisoned")
            .entry(session)
            .or_insert_with(|| Arc::new(Semaphore::new(MAX_INFLIGHT_PER_SESSION)))
            .clone()
    }

    /// Allocate a fresh local `exchangeId` for an exchange we are
    /// initiating, avoiding any value already in use as an initiator
    /// exchange on this session (spec.md §4.F: "rolling counter avoiding
    /// in-use values").
    fn allocate_exchange_id(&self, session: Handle<Session>) -> u16 {
        let exchanges = self.exchanges.read().expect("lock poisoned");
        let mut next = self.next_outbound_id.write().expect("lock poisoned");
        let start = *next.get(&session).unwrap_or(&0);
        let mut candidate = start;
        loop {
            let key = ExchangeKey { session, exchange_id: candidate, is_initiator: true };
            if !exchanges.contains_key(&key) {
                next.insert(session, candidate.wrapping_add(1));
                return candidate;
            }
            candidate = candidate.wrapping_add(1);
            if candidate == start {
                // Exhausted the entire u16 space with none free; extremely
                // unlikely given the per-session budget cap, but avoid a
                // silent infinite loop.
                candidate = rand::thread_rng().gen();
            }
        }
    }

    /// Start a new exchange we are initiating. Blocks (up to
    /// [`OUTBOUND_QUEUE_TIMEOUT`]) if the session's in-flight budget is
    /// exhausted.
    pub async fn open_outbound(
        &self,
        session: Handle<Session>,
        protocol_id: u16,
        base_interval: Duration,
        session_closing: &tokio_util::sync::CancellationToken,
    ) -> Result<ExchangeKey, ExchangeError> {
        let semaphore = self.budget_for(session);
        let permit = tokio::time::timeout(OUTBOUND_QUEUE_TIMEOUT, semaphore.acquire_owned())
            .await
            .map_err(|_| ExchangeError::QueueTimeout)?
            .expect("semaphore never closed");

        let exchange_id = self.allocate_exchange_id(session);
        let key = ExchangeKey { session, exchange_id, is_initiator: true };
        let exchange = Exchange::new(key, protocol_id, base_interval, session_closing);
        self.exchanges.write().expect("lock poisoned").insert(key, LiveExchange { exchange, _permit: Some(permit) });
        debug!(exchange_id, protocol_id, "opened outbound exchange");
        Ok(key)
    }

    /// Inbound message arrived for `(session, exchange_id)`. `peer_is_initiator`
    /// is the sender's `isInitiator` payload-header bit. If no matching
    /// exchange exists and the peer claims to be the initiator, a new
    /// responder-side exchange is created; otherwise an unmatched
    /// continuation is a protocol error.
    pub fn dispatch_inbound(
        &self,
        session: Handle<Session>,
        exchange_id: u16,
        peer_is_initiator: bool,
        protocol_id: u16,
        base_interval: Duration,
        session_closing: &tokio_util::sync::CancellationToken,
    ) -> Result<ExchangeKey, ExchangeError> {
        let local_is_initiator = !peer_is_initiator;
        let key = ExchangeKey { session, exchange_id, is_initiator: local_is_initiator };

        let mut exchanges = self.exchanges.write().expect("lock poisoned");
        if exchanges.contains_key(&key) {
            return Ok(key);
        }
        if !peer_is_initiator {
            return Err(ExchangeError::UnknownExchange { exchange_id, is_initiator: local_is_initiator });
        }
        if !self.handlers.read().expect("lock poisoned").contains_key(&protocol_id) {
            return Err(ExchangeError::UnknownProtocol(protocol_id));
        }
        let exchange = Exchange::new(key, protocol_id, base_interval, session_closing);
        exchanges.insert(key, LiveExchange { exchange, _permit: None });
        debug!(exchange_id, protocol_id, "opened inbound (responder) exchange");
        Ok(key)
    }

    pub fn handler_for(&self, protocol_id: u16) -> Option<Arc<dyn ProtocolHandler>> {
        self.handlers.read().expect("lock poisoned").get(&protocol_id).cloned()
    }

    pub fn with_mrp<R>(&self, key: ExchangeKey, f: impl FnOnce(&mut matter_mrp::MrpState) -> R) -> Option<R> {
        self.exchanges.write().expect("lock poisoned").get_mut(&key).map(|live| f(&mut live.exchange.mrp))
    }

    /// Close one exchange (spec.md §3: "On close all pending retransmit
    /// timers stop and queued messages are dropped"). Returns whether a
    /// standalone ack was still owed.
    pub fn close(&self, key: ExchangeKey) -> bool {
        let mut exchanges = self.exchanges.write().expect("lock poisoned");
        let Some(mut live) = exchanges.remove(&key) else { return false };
        live.exchange.close()
    }

    /// Session torn down: close every exchange on it (spec.md §3:
    /// exchanges are exclusively owned by their manager, keyed by their
    /// tuple, and do not outlive their session).
    pub fn close_all_for_session(&self, session: Handle<Session>) -> Vec<ExchangeKey> {
        let keys: Vec<ExchangeKey> = {
            let exchanges = self.exchanges.read().expect("lock poisoned");
            exchanges.keys().filter(|k| k.session == session).copied().collect()
        };
        if !keys.is_empty() {
            warn!(count = keys.len(), "closing all exchanges for destroyed session");
        }
        for key in &keys {
            self.close(*key);
        }
        self.budgets.write().expect("lock poisoned").remove(&session);
        self.next_outbound_id.write().expect("lock poisoned").remove(&session);
        keys
    }

    pub fn outstanding_count(&self) -> usize {
        self.exchanges.read().expect("lock poisoned").len()
    }

    /// Periodic tick hook (spec.md §4.C): every exchange's retransmit
    /// queue is checked against `now`, due entries are bumped/rescheduled
    /// or reported as exhausted, and the caller is handed back exactly
    /// what needs to go back out on the wire.
    pub fn poll_retransmits(&self, now: std::time::Instant, jitter: f64) -> Vec<(ExchangeKey, Vec<(u32, Result<Vec<u8>, matter_mrp::MrpError>)>)> {
        let mut exchanges = self.exchanges.write().expect("lock poisoned");
        exchanges
            .iter_mut()
            .map(|(key, live)| (*key, live.exchange.mrp.due_retransmits(now, jitter)))
            .filter(|(_, due)| !due.is_empty())
            .collect()
    }

    /// Periodic tick hook: exchanges whose standalone-ack timer has
    /// fired, each needing a bare ack sent with no piggyback payload.
    pub fn poll_standalone_acks(&self, now: std::time::Instant) -> Vec<ExchangeKey> {
        let mut exchanges = self.exchanges.write().expect("lock poisoned");
        exchanges
            .iter_mut()
            .filter_map(|(key, live)| live.exchange.mrp.take_due_standalone_ack(now).then_some(*key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_types::Arena;

    fn fake_session_handle() -> Handle<Session> {
        let mut session_arena: Arena<Session> = Arena::new();
        session_arena.insert(Session::new(
            matter_session::SessionKind::Unsecure,
            1,
            1,
            None,
            None,
            [0; 16],
            [0; 16],
            [0; 32],
            1,
            matter_session::OUR_DEFAULTS,
        ))
    }

    #[tokio::test]
    async fn inbound_then_outbound_keys_are_independent() {
        let manager = ExchangeManager::new();
        manager.register_protocol(1, Arc::new(NoopHandler));
        let session = fake_session_handle();
        let token = tokio_util::sync::CancellationToken::new();

        let inbound_key = manager.dispatch_inbound(session, 100, true, 1, Duration::from_millis(500), &token).unwrap();
        assert!(!inbound_key.is_initiator);

        let outbound_key = manager.open_outbound(session, 1, Duration::from_millis(500), &token).await.unwrap();
        assert!(outbound_key.is_initiator);
        assert_eq!(manager.outstanding_count(), 2);
    }

    #[tokio::test]
    async fn continuation_without_prior_exchange_is_rejected() {
        let manager = ExchangeManager::new();
        let session = fake_session_handle();
        let token = tokio_util::sync::CancellationToken::new();
        let err = manager.dispatch_inbound(session, 5, false, 1, Duration::from_millis(500), &token).unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownExchange { exchange_id: 5, .. }));
    }

    #[tokio::test]
    async fn outbound_budget_is_released_on_close() {
        let manager = ExchangeManager::new();
        let session = fake_session_handle();
        let token = tokio_util::sync::CancellationToken::new();
        let mut keys = Vec::new();
        for _ in 0..MAX_INFLIGHT_PER_SESSION {
            keys.push(manager.open_outbound(session, 1, Duration::from_millis(500), &token).await.unwrap());
        }
        assert_eq!(manager.outstanding_count(), MAX_INFLIGHT_PER_SESSION);

        manager.close(keys[0]);
        let fresh = manager.open_outbound(session, 1, Duration::from_millis(500), &token).await;
        assert!(fresh.is_ok());
    }

    struct NoopHandler;
    #[async_trait::async_trait]
    impl ProtocolHandler for NoopHandler {
        async fn on_message(&self, _key: ExchangeKey, _opcode: u8, _payload: &[u8]) {}
        async fn on_exchange_closed(&self, _key: ExchangeKey) {}
    }
}
