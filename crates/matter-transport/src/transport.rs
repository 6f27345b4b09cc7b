//! `Transport` (spec.md §4.B): polymorphic over datagram, stream, and
//! BLE-BTP channels. Rust has no natural "register a callback" primitive for
//! async inbound data, so `onData` is realized as an `mpsc::Receiver` handed
//! back at construction time — the same shape the project already uses for
//! fanning out inbound bytes (see `FanoutServer`'s broadcast channel).

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Datagram,
    Stream,
    Ble,
}

/// One inbound frame plus the peer it arrived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub peer: SocketAddr,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether this transport can reach `peer_hint` as a `kind` channel.
    fn supports(&self, kind: TransportKind, peer_hint: SocketAddr) -> bool;

    /// Open (or confirm) a channel to `address`; for connectionless
    /// transports this is a no-op validity check, for stream transports it
    /// establishes the connection.
    async fn open_channel(&self, address: SocketAddr) -> Result<(), TransportError>;

    async fn send(&self, address: SocketAddr, data: &[u8]) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
