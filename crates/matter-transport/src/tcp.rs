use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{InboundMessage, Transport, TransportKind};

/// Default `maxTcpMessageSize` (spec.md §4.A) used until both ends
/// negotiate a larger value in their session parameters.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64_000;

/// A large-message-capable TCP transport. Frames are length-prefixed
/// (4-byte LE byte count) since TCP has no inherent message boundary.
pub struct TcpTransport {
    connections: Arc<Mutex<HashMap<SocketAddr, OwnedWriteHalf>>>,
    cancel: CancellationToken,
    max_message_size: usize,
    local_addr: SocketAddr,
    tx: mpsc::Sender<InboundMessage>,
}

impl TcpTransport {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn bind(addr: SocketAddr, max_message_size: usize) -> Result<(Self, mpsc::Receiver<InboundMessage>), TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::BindFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::BindFailed)?;
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let connections: Arc<Mutex<HashMap<SocketAddr, OwnedWriteHalf>>> = Arc::new(Mutex::new(HashMap::new()));

        let accept_cancel = cancel.child_token();
        let accept_connections = Arc::clone(&connections);
        let accept_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                register_connection(stream, peer, &accept_connections, accept_tx.clone(), accept_cancel.child_token(), max_message_size).await;
                            }
                            Err(error) => {
                                warn!(%error, "tcp transport accept error");
                                break;
                            }
                        }
                    }
                }
            }
            debug!("tcp transport accept loop exiting");
        });

        Ok((TcpTransport { connections, cancel, max_message_size, local_addr, tx }, rx))
    }
}

async fn register_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connections: &Arc<Mutex<HashMap<SocketAddr, OwnedWriteHalf>>>,
    tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    max_message_size: usize,
) {
    let (read_half, write_half) = stream.into_split();
    connections.lock().await.insert(peer, write_half);
    tokio::spawn(read_loop(read_half, peer, tx, cancel, max_message_size));
}

async fn read_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    peer: SocketAddr,
    tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    max_message_size: usize,
) {
    loop {
        let mut len_buf = [0u8; 4];
        tokio::select! {
            () = cancel.cancelled() => break,
            result = read_half.read_exact(&mut len_buf) => {
                if result.is_err() {
                    break;
                }
            }
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > max_message_size {
            warn!(len, max_message_size, "tcp frame exceeds negotiated maxTcpMessageSize, closing connection");
            break;
        }
        let mut data = vec![0u8; len];
        if read_half.read_exact(&mut data).await.is_err() {
            break;
        }
        if tx.send(InboundMessage { peer, data }).await.is_err() {
            break;
        }
    }
    debug!(%peer, "tcp transport read loop exiting");
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn supports(&self, kind: TransportKind, _peer_hint: SocketAddr) -> bool {
        kind == TransportKind::Stream
    }

    async fn open_channel(&self, address: SocketAddr) -> Result<(), TransportError> {
        if self.connections.lock().await.contains_key(&address) {
            return Ok(());
        }
        let stream = TcpStream::connect(address).await.map_err(TransportError::SendFailed)?;
        register_connection(stream, address, &self.connections, self.tx.clone(), self.cancel.child_token(), self.max_message_size).await;
        Ok(())
    }

    async fn send(&self, address: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > self.max_message_size {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "frame exceeds negotiated maxTcpMessageSize",
            )));
        }
        self.open_channel(address).await?;
        let mut connections = self.connections.lock().await;
        let write_half = connections.get_mut(&address).ok_or(TransportError::Closed)?;
        write_half.write_all(&(data.len() as u32).to_le_bytes()).await.map_err(TransportError::SendFailed)?;
        write_half.write_all(data).await.map_err(TransportError::SendFailed)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.cancel.cancel();
        self.connections.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_receive_round_trips_a_frame() {
        let (server, mut server_rx) = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), DEFAULT_MAX_MESSAGE_SIZE).await.unwrap();
        let server_addr = server.local_addr();

        let (client, _client_rx) = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), DEFAULT_MAX_MESSAGE_SIZE).await.unwrap();
        client.send(server_addr, b"hello over tcp").await.unwrap();

        let received = server_rx.recv().await.unwrap();
        assert_eq!(received.data, b"hello over tcp");
    }

    #[tokio::test]
    async fn refuses_to_send_frame_over_negotiated_limit() {
        let (client, _rx) = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let oversized = vec![0u8; 17];
        assert!(client.send(peer, &oversized).await.is_err());
    }
}
