//! Shared scalar types for the Matter secure-session/interaction core:
//! identifiers, peer addressing, interaction-model paths, ACL access
//! levels, the external `Schema` collaborator seam, and the generational
//! arena used to own Sessions/Fabrics/Exchanges/Subscriptions.

pub mod access;
pub mod arena;
pub mod ids;
pub mod path;
pub mod peer;
pub mod schema;

pub use access::AccessLevel;
pub use arena::{Arena, Handle};
pub use ids::{AttributeId, ClusterId, CommandId, EndpointId, EventId, FabricIndex, GroupId, NodeId, VendorId};
pub use path::{
    AttributePath, CommandPath, ConcreteAttributePath, ConcreteClusterPath, ConcreteCommandPath,
    ConcreteEventPath, EventPath,
};
pub use peer::PeerAddress;
pub use schema::{AttributeMeta, CommandMeta, EventMeta, EventPriority, OpaqueValue, Quality, Schema, StaticSchema};
