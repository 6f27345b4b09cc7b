//! Interaction-model path tuples with wildcard semantics at each position
//! (spec.md §3, §4.G.1).

use crate::ids::{AttributeId, ClusterId, CommandId, EndpointId, EventId};
use serde::{Deserialize, Serialize};

/// `None` at any position is a wildcard over that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    pub endpoint: Option<EndpointId>,
    pub cluster: Option<ClusterId>,
    pub attribute: Option<AttributeId>,
    pub list_index: Option<u16>,
}

impl AttributePath {
    pub fn wildcard() -> Self {
        AttributePath { endpoint: None, cluster: None, attribute: None, list_index: None }
    }

    pub fn is_concrete(&self) -> bool {
        self.endpoint.is_some() && self.cluster.is_some() && self.attribute.is_some()
    }

    /// Does `concrete` (a fully-resolved path) fall within this pattern?
    pub fn matches(&self, concrete: &ConcreteAttributePath) -> bool {
        self.endpoint.is_none_or(|e| e == concrete.endpoint)
            && self.cluster.is_none_or(|c| c == concrete.cluster)
            && self.attribute.is_none_or(|a| a == concrete.attribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPath {
    pub endpoint: Option<EndpointId>,
    pub cluster: Option<ClusterId>,
    pub event: Option<EventId>,
    /// Minimum event number to report (spec.md §4.G.2: "monotonic event
    /// number ≥ eventMin").
    pub event_min: Option<u64>,
}

impl EventPath {
    pub fn matches(&self, concrete: &ConcreteEventPath) -> bool {
        self.endpoint.is_none_or(|e| e == concrete.endpoint)
            && self.cluster.is_none_or(|c| c == concrete.cluster)
            && self.event.is_none_or(|ev| ev == concrete.event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandPath {
    pub endpoint: Option<EndpointId>,
    pub cluster: Option<ClusterId>,
    pub command: Option<CommandId>,
}

/// A fully-resolved (no wildcards) attribute location, produced by path
/// resolution against the local endpoint graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcreteAttributePath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub attribute: AttributeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcreteEventPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub event: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcreteCommandPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub command: CommandId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcreteClusterPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_path_matches_any_concrete_location() {
        let pattern = AttributePath::wildcard();
        let concrete = ConcreteAttributePath {
            endpoint: EndpointId(1),
            cluster: ClusterId(6),
            attribute: AttributeId(0),
        };
        assert!(pattern.matches(&concrete));
    }

    #[test]
    fn concrete_pattern_only_matches_same_location() {
        let pattern = AttributePath {
            endpoint: Some(EndpointId(1)),
            cluster: Some(ClusterId(6)),
            attribute: Some(AttributeId(0)),
            list_index: None,
        };
        let same = ConcreteAttributePath { endpoint: EndpointId(1), cluster: ClusterId(6), attribute: AttributeId(0) };
        let other = ConcreteAttributePath { endpoint: EndpointId(2), cluster: ClusterId(6), attribute: AttributeId(0) };
        assert!(pattern.matches(&same));
        assert!(!pattern.matches(&other));
    }
}
