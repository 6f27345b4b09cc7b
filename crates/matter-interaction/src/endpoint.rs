//! The local endpoint graph (spec.md §4.G.1, §9: "Cyclic graphs... store
//! relationships as indices; traversal is by explicit lookup"): the
//! concrete data the Interaction Engine walks to resolve wildcard paths
//! and check per-element access.

use matter_types::{AccessLevel, AttributeId, AttributePath, ClusterId, EndpointId, EventPath, NodeId, OpaqueValue};
use std::collections::HashMap;

/// One ACL entry on an endpoint: grants `privilege` to every node in
/// `subjects` (empty = any authenticated subject on the fabric).
#[derive(Debug, Clone)]
pub struct AclEntry {
    pub subjects: Vec<NodeId>,
    pub privilege: AccessLevel,
}

impl AclEntry {
    fn grants(&self, subject: Option<NodeId>, required: AccessLevel) -> bool {
        if !self.privilege.satisfies(required) {
            return false;
        }
        self.subjects.is_empty() || subject.is_some_and(|s| self.subjects.contains(&s))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterInstance {
    pub data_version: u32,
    pub attributes: HashMap<AttributeId, OpaqueValue>,
    /// List attributes are stored as `OpaqueValue::Array` and addressed
    /// element-wise via `AttributePath::list_index` (spec.md §4.G.2/.3).
    pub next_event_number: u64,
}

impl ClusterInstance {
    pub fn bump_version(&mut self) {
        self.data_version = self.data_version.wrapping_add(1);
    }
}

pub struct EndpointInstance {
    pub endpoint: EndpointId,
    pub acl: Vec<AclEntry>,
    pub clusters: HashMap<ClusterId, ClusterInstance>,
}

impl EndpointInstance {
    pub fn new(endpoint: EndpointId) -> Self {
        EndpointInstance { endpoint, acl: Vec::new(), clusters: HashMap::new() }
    }

    pub fn with_acl(mut self, entry: AclEntry) -> Self {
        self.acl.push(entry);
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterId, instance: ClusterInstance) -> Self {
        self.clusters.insert(cluster, instance);
        self
    }

    fn check_access(&self, subject: Option<NodeId>, required: AccessLevel) -> bool {
        self.acl.iter().any(|e| e.grants(subject, required))
    }
}

/// The node's full set of endpoints (spec.md §3: endpoint graph, "cyclic
/// graphs... store relationships as indices").
#[derive(Default)]
pub struct EndpointGraph {
    endpoints: HashMap<EndpointId, EndpointInstance>,
}

impl EndpointGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, endpoint: EndpointInstance) {
        self.endpoints.insert(endpoint.endpoint, endpoint);
    }

    pub fn get(&self, endpoint: EndpointId) -> Option<&EndpointInstance> {
        self.endpoints.get(&endpoint)
    }

    pub fn get_mut(&mut self, endpoint: EndpointId) -> Option<&mut EndpointInstance> {
        self.endpoints.get_mut(&endpoint)
    }

    fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.endpoints.keys().copied().collect()
    }

    /// Expand an `AttributePath` pattern against the endpoint graph
    /// (spec.md §4.G.1). Wildcard expansion silently excludes locations
    /// the requester lacks `required` access to (the standard Matter
    /// "wildcard expansion omits inaccessible paths" behavior); a fully
    /// concrete path instead surfaces an `UnsupportedAccess` per-path
    /// error so the caller can report it in place (spec.md §4.G.2: "Error
    /// per-path is reported in place; the overall request still
    /// succeeds").
    pub fn resolve_attribute_paths(
        &self,
        pattern: &AttributePath,
        subject: Option<NodeId>,
        required: AccessLevel,
    ) -> Vec<Result<matter_types::ConcreteAttributePath, (matter_types::ConcreteAttributePath, crate::error::ImStatus)>> {
        let is_concrete = pattern.is_concrete();
        let mut out = Vec::new();
        let endpoint_ids = match pattern.endpoint {
            Some(e) => vec![e],
            None => self.endpoint_ids(),
        };
        for endpoint_id in endpoint_ids {
            let Some(endpoint) = self.endpoints.get(&endpoint_id) else { continue };
            let cluster_ids: Vec<ClusterId> = match pattern.cluster {
                Some(c) => vec![c],
                None => endpoint.clusters.keys().copied().collect(),
            };
            for cluster_id in cluster_ids {
                let Some(cluster) = endpoint.clusters.get(&cluster_id) else { continue };
                let attribute_ids: Vec<AttributeId> = match pattern.attribute {
                    Some(a) => vec![a],
                    None => cluster.attributes.keys().copied().collect(),
                };
                for attribute_id in attribute_ids {
                    let concrete = matter_types::ConcreteAttributePath { endpoint: endpoint_id, cluster: cluster_id, attribute: attribute_id };
                    if endpoint.check_access(subject, required) {
                        out.push(Ok(concrete));
                    } else if is_concrete {
                        out.push(Err((concrete, crate::error::ImStatus::UnsupportedAccess)));
                    }
                }
            }
        }
        out
    }

    pub fn resolve_event_paths(&self, pattern: &EventPath) -> Vec<matter_types::ConcreteEventPath> {
        let mut out = Vec::new();
        let endpoint_ids = match pattern.endpoint {
            Some(e) => vec![e],
            None => self.endpoint_ids(),
        };
        for endpoint_id in endpoint_ids {
            let Some(endpoint) = self.endpoints.get(&endpoint_id) else { continue };
            let cluster_ids: Vec<ClusterId> = match pattern.cluster {
                Some(c) => vec![c],
                None => endpoint.clusters.keys().copied().collect(),
            };
            for cluster_id in cluster_ids {
                if endpoint.clusters.contains_key(&cluster_id) {
                    if let Some(event) = pattern.event {
                        out.push(matter_types::ConcreteEventPath { endpoint: endpoint_id, cluster: cluster_id, event });
                    }
                }
            }
        }
        out
    }

    pub fn check_invoke_access(&self, endpoint: EndpointId, subject: Option<NodeId>, required: AccessLevel) -> bool {
        self.endpoints.get(&endpoint).is_some_and(|e| e.check_access(subject, required))
    }

    pub fn command_exists(&self, path: &matter_types::ConcreteCommandPath) -> bool {
        self.endpoints.get(&path.endpoint).is_some_and(|e| e.clusters.contains_key(&path.cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_types::{AttributeId, ClusterId, EndpointId};

    fn sample_graph() -> EndpointGraph {
        let mut graph = EndpointGraph::new();
        let mut cluster = ClusterInstance::default();
        cluster.attributes.insert(AttributeId(0), serde_json::json!(false));
        let endpoint = EndpointInstance::new(EndpointId(1))
            .with_acl(AclEntry { subjects: vec![], privilege: AccessLevel::View })
            .with_cluster(ClusterId(6), cluster);
        graph.insert(endpoint);
        graph
    }

    #[test]
    fn wildcard_expansion_finds_the_single_attribute() {
        let graph = sample_graph();
        let pattern = AttributePath::wildcard();
        let resolved = graph.resolve_attribute_paths(&pattern, Some(NodeId(1)), AccessLevel::View);
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].is_ok());
    }

    #[test]
    fn concrete_path_without_access_reports_unsupported_access_in_place() {
        let mut graph = EndpointGraph::new();
        let mut cluster = ClusterInstance::default();
        cluster.attributes.insert(AttributeId(0), serde_json::json!(false));
        let endpoint = EndpointInstance::new(EndpointId(1))
            .with_acl(AclEntry { subjects: vec![NodeId(99)], privilege: AccessLevel::Administer })
            .with_cluster(ClusterId(6), cluster);
        graph.insert(endpoint);

        let pattern = AttributePath { endpoint: Some(EndpointId(1)), cluster: Some(ClusterId(6)), attribute: Some(AttributeId(0)), list_index: None };
        let resolved = graph.resolve_attribute_paths(&pattern, Some(NodeId(1)), AccessLevel::View);
        assert_eq!(resolved.len(), 1);
        assert!(matches!(resolved[0], Err((_, crate::error::ImStatus::UnsupportedAccess))));
    }

    #[test]
    fn wildcard_expansion_silently_drops_inaccessible_locations() {
        let mut graph = EndpointGraph::new();
        let mut cluster = ClusterInstance::default();
        cluster.attributes.insert(AttributeId(0), serde_json::json!(false));
        let endpoint = EndpointInstance::new(EndpointId(1))
            .with_acl(AclEntry { subjects: vec![NodeId(99)], privilege: AccessLevel::Administer })
            .with_cluster(ClusterId(6), cluster);
        graph.insert(endpoint);

        let pattern = AttributePath::wildcard();
        let resolved = graph.resolve_attribute_paths(&pattern, Some(NodeId(1)), AccessLevel::View);
        assert!(resolved.is_empty());
    }
}
