//! Interaction Engine (spec.md §4.G, "the hardest subcomponent"):
//! wildcard path resolution against the local endpoint graph, and the
//! Read/Write/Invoke/Subscribe state machines built on top of it.

pub mod endpoint;
pub mod error;
pub mod invoke;
pub mod read;
pub mod subscribe;
pub mod timed;
pub mod write;

pub use endpoint::{AclEntry, ClusterInstance, EndpointGraph, EndpointInstance};
pub use error::{ImStatus, StatusError};
pub use invoke::{invoke, CommandDataIn, CommandHandler, InvokeResponse};
pub use read::{read, DataVersionFilter, ReadRequest, ReportChunk};
pub use subscribe::{accept as accept_subscription, SubscribeAccept, SubscribeRequest};
pub use timed::{TimedCheck, TimedInteractionGuard};
pub use write::{write, AttributeDataIn, ListOp, TimedContext, WriteOutcome, WriteStatus};
