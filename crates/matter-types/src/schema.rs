//! The `Schema` collaborator (spec.md §1, §9): "given cluster/attribute/event
//! IDs, return type, access, quality and TLV codec". The cluster
//! data-model descriptor tables themselves are explicitly out of scope
//! (thousands of generated tables); this module only defines the trait
//! seam the Interaction Engine programs against, plus a small in-memory
//! implementation used by tests and the example node binary.

use crate::access::AccessLevel;
use crate::ids::{AttributeId, ClusterId, CommandId, EventId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An opaque, already-decoded attribute/command/event payload.
///
/// Real TLV encode/decode is an external primitive (spec.md §1); carrying
/// `serde_json::Value` here mirrors how a forward-compatible opaque
/// payload shape is typically represented in this codebase's JSON-facing
/// config/status types.
pub type OpaqueValue = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Value changes shouldn't be persisted across a power cycle.
    Volatile,
    /// Value is fixed for the life of the node (e.g. vendor ID).
    Fixed,
    /// Ordinary persisted, mutable value.
    Nullable,
    Normal,
}

#[derive(Debug, Clone)]
pub struct AttributeMeta {
    pub readable: bool,
    pub writable: bool,
    pub read_access: AccessLevel,
    pub write_access: AccessLevel,
    pub quality: Quality,
    /// Declared `timed` per spec.md §4.G.3 — writes require an armed
    /// TimedRequest.
    pub timed_write: bool,
    /// List attributes support `Append`/`Replace`/`Remove` chunked writes.
    pub is_list: bool,
}

#[derive(Debug, Clone)]
pub struct CommandMeta {
    pub invoke_access: AccessLevel,
    pub timed_invoke: bool,
}

#[derive(Debug, Clone)]
pub struct EventMeta {
    pub read_access: AccessLevel,
    pub priority: EventPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Debug,
    Info,
    Critical,
}

/// Cluster/attribute/event/command metadata resolution, external to this
/// workspace in a real node (generated from the Matter data model XML).
pub trait Schema: Send + Sync {
    fn attribute_meta(&self, cluster: ClusterId, attribute: AttributeId) -> Option<AttributeMeta>;
    fn command_meta(&self, cluster: ClusterId, command: CommandId) -> Option<CommandMeta>;
    fn event_meta(&self, cluster: ClusterId, event: EventId) -> Option<EventMeta>;
}

/// A small static-table `Schema` for tests and the example node binary.
/// Not meant to stand in for a real generated data-model registry.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    attributes: HashMap<(ClusterId, AttributeId), AttributeMeta>,
    commands: HashMap<(ClusterId, CommandId), CommandMeta>,
    events: HashMap<(ClusterId, EventId), EventMeta>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, cluster: ClusterId, attribute: AttributeId, meta: AttributeMeta) -> Self {
        self.attributes.insert((cluster, attribute), meta);
        self
    }

    pub fn with_command(mut self, cluster: ClusterId, command: CommandId, meta: CommandMeta) -> Self {
        self.commands.insert((cluster, command), meta);
        self
    }

    pub fn with_event(mut self, cluster: ClusterId, event: EventId, meta: EventMeta) -> Self {
        self.events.insert((cluster, event), meta);
        self
    }
}

impl Schema for StaticSchema {
    fn attribute_meta(&self, cluster: ClusterId, attribute: AttributeId) -> Option<AttributeMeta> {
        self.attributes.get(&(cluster, attribute)).cloned()
    }

    fn command_meta(&self, cluster: ClusterId, command: CommandId) -> Option<CommandMeta> {
        self.commands.get(&(cluster, command)).cloned()
    }

    fn event_meta(&self, cluster: ClusterId, event: EventId) -> Option<EventMeta> {
        self.events.get(&(cluster, event)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_schema_round_trips_registered_metadata() {
        let cluster = ClusterId(6);
        let attr = AttributeId(0);
        let schema = StaticSchema::new().with_attribute(
            cluster,
            attr,
            AttributeMeta {
                readable: true,
                writable: true,
                read_access: AccessLevel::View,
                write_access: AccessLevel::Operate,
                quality: Quality::Normal,
                timed_write: false,
                is_list: false,
            },
        );
        let meta = schema.attribute_meta(cluster, attr).unwrap();
        assert!(meta.readable && meta.writable);
        assert!(schema.attribute_meta(cluster, AttributeId(99)).is_none());
    }
}
