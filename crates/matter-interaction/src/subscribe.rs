//! Subscribe request establishment (spec.md §4.G.5): acceptance,
//! subscription id assignment and the priming read. Ongoing dirty-set
//! tracking and the publishing timer loop are owned by the Subscription
//! Manager, not here (spec.md §4.H) — this module only covers the
//! request/response handshake at the Interaction Engine boundary.

use crate::endpoint::EndpointGraph;
use crate::read::{read, DataVersionFilter, ReadRequest, ReportChunk};
use matter_types::{AttributePath, EventPath, NodeId};

#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub min_interval_secs: u16,
    pub max_interval_secs: u16,
    pub attribute_paths: Vec<AttributePath>,
    pub event_paths: Vec<EventPath>,
    pub data_version_filters: Vec<DataVersionFilter>,
    pub is_fabric_filtered: bool,
    /// `false` cancels every prior subscription from the same peer on
    /// accept (spec.md §4.G.5).
    pub keep_subscriptions: bool,
}

#[derive(Debug, Clone)]
pub struct SubscribeAccept {
    pub subscription_id: u32,
    pub min_interval_secs: u16,
    pub max_interval_secs: u16,
    pub priming_report: Vec<Vec<ReportChunk>>,
}

/// Accept `request` and perform the priming read (spec.md §4.G.5: "On
/// acceptance, perform an initial priming Read over the same paths").
/// Rejection (bad interval range, zero paths) is the caller's concern —
/// this function assumes the request already passed those checks.
pub fn accept(graph: &EndpointGraph, request: &SubscribeRequest, subject: Option<NodeId>, subscription_id: u32, max_chunk_bytes: usize) -> SubscribeAccept {
    let priming = ReadRequest {
        attribute_paths: request.attribute_paths.clone(),
        event_paths: request.event_paths.clone(),
        data_version_filters: request.data_version_filters.clone(),
        is_fabric_filtered: request.is_fabric_filtered,
    };
    SubscribeAccept {
        subscription_id,
        min_interval_secs: request.min_interval_secs,
        max_interval_secs: request.max_interval_secs,
        priming_report: read(graph, &priming, subject, max_chunk_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{AclEntry, ClusterInstance, EndpointInstance};
    use matter_types::{AccessLevel, AttributeId, ClusterId, EndpointId};

    #[test]
    fn accept_runs_a_priming_read_over_the_requested_paths() {
        let mut graph = EndpointGraph::new();
        let mut cluster = ClusterInstance::default();
        cluster.attributes.insert(AttributeId(0), serde_json::json!(false));
        let endpoint = EndpointInstance::new(EndpointId(1))
            .with_acl(AclEntry { subjects: vec![], privilege: AccessLevel::View })
            .with_cluster(ClusterId(6), cluster);
        graph.insert(endpoint);

        let request = SubscribeRequest {
            min_interval_secs: 0,
            max_interval_secs: 60,
            attribute_paths: vec![AttributePath::wildcard()],
            event_paths: vec![],
            data_version_filters: vec![],
            is_fabric_filtered: false,
            keep_subscriptions: true,
        };
        let accepted = accept(&graph, &request, Some(NodeId(1)), 7, 1024);
        assert_eq!(accepted.subscription_id, 7);
        let total: usize = accepted.priming_report.iter().map(Vec::len).sum();
        assert_eq!(total, 1);
    }
}
