//! Peer UDP address for a *secure* session, keyed by session handle rather
//! than by [`crate::secure_channel::PeerRoutingTable`]'s `ExchangeKey` —
//! once a session exists its exchanges come and go, but replies and
//! subscription publishes need the address for as long as the session
//! itself lives. Populated by `crate::run`'s inbound dispatch loop as
//! secure datagrams arrive.

use matter_session::Session;
use matter_types::Handle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

#[derive(Default)]
pub struct SessionRouting {
    addrs: Mutex<HashMap<Handle<Session>, SocketAddr>>,
}

impl SessionRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session: Handle<Session>, addr: SocketAddr) {
        self.addrs.lock().expect("lock poisoned").insert(session, addr);
    }

    pub fn get(&self, session: Handle<Session>) -> Option<SocketAddr> {
        self.addrs.lock().expect("lock poisoned").get(&session).copied()
    }

    pub fn remove(&self, session: Handle<Session>) {
        self.addrs.lock().expect("lock poisoned").remove(&session);
    }
}
