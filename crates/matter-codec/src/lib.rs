pub mod counter;
pub mod error;
pub mod header;
pub mod packet;

pub use counter::MessageCounter;
pub use error::CodecError;
pub use header::{NodeAddress, PacketHeader, PayloadHeader, SecurityFlags};
pub use packet::{ChannelLimit, Packet, DEFAULT_TCP_MAX_MESSAGE_SIZE, UDP_MAX_PAYLOAD};
