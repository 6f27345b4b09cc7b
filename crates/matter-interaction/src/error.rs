//! Interaction Model status codes (spec.md §7): the one-to-one mapping
//! target for protocol/status errors. Numeric values match the Matter
//! core specification's IM status-code table.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImStatus {
    Success = 0x00,
    Failure = 0x01,
    InvalidSubscription = 0x7d,
    UnsupportedAccess = 0x7e,
    UnsupportedEndpoint = 0x7f,
    InvalidAction = 0x80,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8b,
    UnreportableAttribute = 0x8c,
    InvalidDataType = 0x8d,
    UnsupportedCluster = 0x93,
    NoUpstreamSubscription = 0x95,
    NeedsTimedInteraction = 0x96,
    UnsupportedEvent = 0x97,
    PathsExhausted = 0x98,
    TimedRequestMismatch = 0x99,
    FailsafeRequired = 0x9a,
    Busy = 0x9c,
    Timeout = 0x94,
}

impl fmt::Display for ImStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", *self as u8)
    }
}

/// What a cluster handler (or the engine, on its behalf) returns for a
/// failed per-path operation (spec.md §7: "the error type returned by
/// cluster handlers and caught at the engine boundary").
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interaction status {status} (cluster status {cluster_status:?})")]
pub struct StatusError {
    pub status: ImStatus,
    pub cluster_status: Option<u8>,
}

impl StatusError {
    pub fn new(status: ImStatus) -> Self {
        StatusError { status, cluster_status: None }
    }

    pub fn with_cluster_status(status: ImStatus, cluster_status: u8) -> Self {
        StatusError { status, cluster_status: Some(cluster_status) }
    }
}
