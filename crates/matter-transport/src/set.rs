//! `ConnectionlessTransportSet` (spec.md §4.B): routes an outbound address to
//! the first member transport whose `supports` returns true.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::TransportError;
use crate::transport::{Transport, TransportKind};

pub struct ConnectionlessTransportSet {
    members: Vec<Arc<dyn Transport>>,
}

impl ConnectionlessTransportSet {
    pub fn new(members: Vec<Arc<dyn Transport>>) -> Self {
        ConnectionlessTransportSet { members }
    }

    fn select(&self, kind: TransportKind, peer_hint: SocketAddr) -> Option<&Arc<dyn Transport>> {
        self.members.iter().find(|transport| transport.supports(kind, peer_hint))
    }

    pub async fn send(&self, kind: TransportKind, address: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        let transport = self.select(kind, address).ok_or(TransportError::Unsupported(address))?;
        transport.send(address, data).await
    }

    /// Close every member transport; errors from individual members are
    /// collected but do not stop closure of the rest.
    pub async fn close_all(&self) -> Vec<TransportError> {
        let mut errors = Vec::new();
        for transport in &self.members {
            if let Err(error) = transport.close().await {
                errors.push(error);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTransport {
        kind: TransportKind,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn supports(&self, kind: TransportKind, _peer_hint: SocketAddr) -> bool {
            kind == self.kind
        }

        async fn open_channel(&self, _address: SocketAddr) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, _address: SocketAddr, _data: &[u8]) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_to_the_first_member_that_supports_the_kind() {
        let datagram = Arc::new(StubTransport { kind: TransportKind::Datagram, sends: AtomicUsize::new(0) });
        let stream = Arc::new(StubTransport { kind: TransportKind::Stream, sends: AtomicUsize::new(0) });
        let set = ConnectionlessTransportSet::new(vec![datagram.clone(), stream.clone()]);

        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        set.send(TransportKind::Stream, peer, b"data").await.unwrap();

        assert_eq!(datagram.sends.load(Ordering::SeqCst), 0);
        assert_eq!(stream.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_when_no_member_supports_the_requested_kind() {
        let datagram = Arc::new(StubTransport { kind: TransportKind::Datagram, sends: AtomicUsize::new(0) });
        let set = ConnectionlessTransportSet::new(vec![datagram]);
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(set.send(TransportKind::Ble, peer, b"data").await.is_err());
    }
}
