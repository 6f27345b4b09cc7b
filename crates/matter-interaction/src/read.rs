//! Read / Report (spec.md §4.G.2): data-version-filtered attribute reads
//! and event reads, streamed as size-bounded chunks.

use crate::endpoint::EndpointGraph;
use crate::error::ImStatus;
use matter_types::{AccessLevel, AttributePath, ConcreteAttributePath, ConcreteEventPath, EventPath, NodeId, OpaqueValue};

#[derive(Debug, Clone)]
pub struct DataVersionFilter {
    pub cluster_path: matter_types::ConcreteClusterPath,
    pub data_version: u32,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub attribute_paths: Vec<AttributePath>,
    pub event_paths: Vec<EventPath>,
    pub data_version_filters: Vec<DataVersionFilter>,
    pub is_fabric_filtered: bool,
}

#[derive(Debug, Clone)]
pub enum ReportChunk {
    Attribute { path: ConcreteAttributePath, data_version: u32, value: OpaqueValue },
    AttributeStatus { path: ConcreteAttributePath, status: ImStatus },
    Event { path: ConcreteEventPath, event_number: u64, value: OpaqueValue },
}

/// Any single chunk's encoded size must not exceed the session's maximum
/// payload (spec.md §4.G.2); we approximate "encoded size" with the JSON
/// length of the carried value, which is the same `OpaqueValue`
/// representation used throughout this workspace in place of real TLV.
fn approx_encoded_len(value: &OpaqueValue) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0) + 16
}

/// Run a Read/Report over `request` against `graph`, producing chunks no
/// larger than `max_chunk_bytes` each. An over-large single list value is
/// split element-by-element (spec.md: "the list attribute is cleared then
/// emitted element-by-element").
pub fn read(graph: &EndpointGraph, request: &ReadRequest, subject: Option<NodeId>, max_chunk_bytes: usize) -> Vec<Vec<ReportChunk>> {
    let mut flat = Vec::new();

    for pattern in &request.attribute_paths {
        for resolved in graph.resolve_attribute_paths(pattern, subject, AccessLevel::View) {
            match resolved {
                Err((path, status)) => flat.push(ReportChunk::AttributeStatus { path, status }),
                Ok(path) => {
                    let Some(endpoint) = graph.get(path.endpoint) else { continue };
                    let Some(cluster) = endpoint.clusters.get(&path.cluster) else { continue };
                    if filtered_out(&request.data_version_filters, path.endpoint, path.cluster, cluster.data_version) {
                        continue;
                    }
                    match cluster.attributes.get(&path.attribute) {
                        Some(value) => push_attribute_value(&mut flat, path, cluster.data_version, value, max_chunk_bytes),
                        None => flat.push(ReportChunk::AttributeStatus { path, status: ImStatus::UnsupportedAttribute }),
                    }
                }
            }
        }
    }

    for pattern in &request.event_paths {
        for path in graph.resolve_event_paths(pattern) {
            let Some(endpoint) = graph.get(path.endpoint) else { continue };
            let Some(cluster) = endpoint.clusters.get(&path.cluster) else { continue };
            let event_min = pattern.event_min.unwrap_or(0);
            if cluster.next_event_number > event_min {
                // A real engine stores an event log; here we report the
                // latest-known event number as a stand-in, since event
                // *storage* is out of this workspace's scope (spec.md §1).
                flat.push(ReportChunk::Event {
                    path,
                    event_number: cluster.next_event_number.saturating_sub(1),
                    value: OpaqueValue::Null,
                });
            }
        }
    }

    chunk_by_size(flat, max_chunk_bytes)
}

fn filtered_out(filters: &[DataVersionFilter], endpoint: matter_types::EndpointId, cluster: matter_types::ClusterId, current: u32) -> bool {
    filters
        .iter()
        .any(|f| f.cluster_path.endpoint == endpoint && f.cluster_path.cluster == cluster && f.data_version == current)
}

fn push_attribute_value(out: &mut Vec<ReportChunk>, path: ConcreteAttributePath, data_version: u32, value: &OpaqueValue, max_chunk_bytes: usize) {
    if let OpaqueValue::Array(items) = value {
        if approx_encoded_len(value) > max_chunk_bytes && items.len() > 1 {
            for item in items {
                out.push(ReportChunk::Attribute { path, data_version, value: item.clone() });
            }
            return;
        }
    }
    out.push(ReportChunk::Attribute { path, data_version, value: value.clone() });
}

fn chunk_by_size(chunks: Vec<ReportChunk>, max_chunk_bytes: usize) -> Vec<Vec<ReportChunk>> {
    let mut pages = Vec::new();
    let mut current: Vec<ReportChunk> = Vec::new();
    let mut current_size = 0usize;
    for chunk in chunks {
        let size = chunk_size(&chunk);
        if !current.is_empty() && current_size + size > max_chunk_bytes {
            pages.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += size;
        current.push(chunk);
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

fn chunk_size(chunk: &ReportChunk) -> usize {
    match chunk {
        ReportChunk::Attribute { value, .. } => approx_encoded_len(value),
        ReportChunk::AttributeStatus { .. } => 16,
        ReportChunk::Event { value, .. } => approx_encoded_len(value),
    }
}
