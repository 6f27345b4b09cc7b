pub mod error;
pub mod set;
pub mod tcp;
pub mod transport;
pub mod udp;

pub use error::TransportError;
pub use set::ConnectionlessTransportSet;
pub use tcp::{TcpTransport, DEFAULT_MAX_MESSAGE_SIZE};
pub use transport::{InboundMessage, Transport, TransportKind};
pub use udp::UdpTransport;
