use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{InboundMessage, Transport, TransportKind};
use matter_codec::UDP_MAX_PAYLOAD;

/// A connectionless UDP transport (spec.md §4.B). One socket serves every
/// peer; the read loop fans inbound datagrams out over `inbound`.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<(Self, mpsc::Receiver<InboundMessage>), TransportError> {
        let socket = Arc::new(UdpSocket::bind(addr).await.map_err(TransportError::BindFailed)?);
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        let read_socket = Arc::clone(&socket);
        let read_cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut buf = [0u8; UDP_MAX_PAYLOAD];
            loop {
                tokio::select! {
                    () = read_cancel.cancelled() => break,
                    received = read_socket.recv_from(&mut buf) => {
                        match received {
                            Ok((len, peer)) => {
                                let message = InboundMessage { peer, data: buf[..len].to_vec() };
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                warn!(%error, "udp transport read error");
                                break;
                            }
                        }
                    }
                }
            }
            debug!("udp transport read loop exiting");
        });

        Ok((UdpTransport { socket, cancel }, rx))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn supports(&self, kind: TransportKind, _peer_hint: SocketAddr) -> bool {
        kind == TransportKind::Datagram
    }

    async fn open_channel(&self, _address: SocketAddr) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, address: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > UDP_MAX_PAYLOAD {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "datagram exceeds UDP_MAX_PAYLOAD",
            )));
        }
        self.socket.send_to(data, address).await.map_err(TransportError::SendFailed)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_receive_round_trips_a_datagram() {
        let (transport_a, _rx_a) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let (transport_b, mut rx_b) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr_b = transport_b.socket.local_addr().unwrap();

        transport_a.send(addr_b, b"hello matter").await.unwrap();
        let received = rx_b.recv().await.unwrap();
        assert_eq!(received.data, b"hello matter");
    }

    #[tokio::test]
    async fn supports_only_datagram_kind() {
        let (transport, _rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(transport.supports(TransportKind::Datagram, peer));
        assert!(!transport.supports(TransportKind::Stream, peer));
    }

    #[tokio::test]
    async fn refuses_to_send_oversized_datagram() {
        let (transport, _rx) = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let oversized = vec![0u8; UDP_MAX_PAYLOAD + 1];
        assert!(transport.send(peer, &oversized).await.is_err());
    }
}
