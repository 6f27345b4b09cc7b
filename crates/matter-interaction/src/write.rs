//! Write (spec.md §4.G.3): transactional, timed-write-enforcing attribute
//! writes with list `Append`/`Replace`/`Remove` chunk semantics.

use crate::endpoint::EndpointGraph;
use crate::error::ImStatus;
use matter_types::{AccessLevel, ConcreteAttributePath, NodeId, OpaqueValue, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    /// Not a list write, or a monolithic replace of the whole value.
    Replace,
    Append,
    Remove,
}

#[derive(Debug, Clone)]
pub struct AttributeDataIn {
    pub path: ConcreteAttributePath,
    pub value: OpaqueValue,
    pub data_version: Option<u32>,
    pub list_op: ListOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStatus {
    pub path: ConcreteAttributePath,
    pub status: ImStatus,
}

/// Result of a [`write`] call: the per-path statuses plus the subset of
/// paths whose stored value actually changed (spec.md §4.G.3: `$Changed`
/// events fire only for attributes that "actually changed", while
/// `dataVersion` bumps for every touched cluster regardless).
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub statuses: Vec<WriteStatus>,
    pub changed: Vec<ConcreteAttributePath>,
}

/// Timed-interaction state for the exchange issuing this write/invoke
/// (spec.md §4.G.3/.4). `expired` distinguishes "a `TimedRequest` was sent
/// but its window already closed" (response: `Timeout`) from "no
/// `TimedRequest` was ever sent" (response: `NeedsTimedInteraction`).
pub struct TimedContext {
    pub armed: bool,
    pub expired: bool,
}

/// Apply `writes` to `graph` as a single transaction (spec.md §4.G.3: "on
/// any error, all writes in the same request are rolled back"). Returns
/// per-path statuses in input order plus the subset that actually changed
/// the stored value; on any failure the graph is left exactly as it was
/// before this call.
pub fn write(graph: &mut EndpointGraph, writes: &[AttributeDataIn], subject: Option<NodeId>, timed: &TimedContext, schema: &dyn Schema) -> WriteOutcome {
    // Validate every write against schema/ACL/timed-interaction rules
    // first, without mutating anything, so a late failure can't leave a
    // partial transaction behind.
    let mut statuses = Vec::with_capacity(writes.len());
    for entry in writes {
        if let Err(status) = validate(graph, entry, subject, timed, schema) {
            statuses.push(WriteStatus { path: entry.path, status });
        } else {
            statuses.push(WriteStatus { path: entry.path, status: ImStatus::Success });
        }
    }

    if statuses.iter().any(|s| s.status != ImStatus::Success) {
        return WriteOutcome { statuses, changed: Vec::new() };
    }

    // All validated: apply in order, grouping consecutive writes to the
    // same concrete path so repeated Append/Remove ops on one list apply
    // within the same transaction (spec.md: "elements of a list write
    // with the same path are applied in order within a single
    // transaction").
    let mut touched: Vec<(matter_types::EndpointId, matter_types::ClusterId)> = Vec::new();
    let mut changed = Vec::new();
    for entry in writes {
        if apply_one(graph, entry) {
            changed.push(entry.path);
        }
        let key = (entry.path.endpoint, entry.path.cluster);
        if !touched.contains(&key) {
            touched.push(key);
        }
    }
    for (endpoint, cluster) in touched {
        if let Some(ep) = graph.get_mut(endpoint) {
            if let Some(c) = ep.clusters.get_mut(&cluster) {
                c.bump_version();
            }
        }
    }
    WriteOutcome { statuses, changed }
}

fn validate(graph: &EndpointGraph, entry: &AttributeDataIn, subject: Option<NodeId>, timed: &TimedContext, schema: &dyn Schema) -> Result<(), ImStatus> {
    let endpoint = graph.get(entry.path.endpoint).ok_or(ImStatus::UnsupportedEndpoint)?;
    if !graph.check_invoke_access(entry.path.endpoint, subject, AccessLevel::Operate) {
        return Err(ImStatus::UnsupportedAccess);
    }
    let cluster = endpoint.clusters.get(&entry.path.cluster).ok_or(ImStatus::UnsupportedCluster)?;
    if let Some(expected) = entry.data_version {
        if expected != cluster.data_version {
            return Err(ImStatus::ConstraintError);
        }
    }
    if requires_timed_interaction(entry, schema) && !timed.armed {
        return Err(if timed.expired { ImStatus::Timeout } else { ImStatus::NeedsTimedInteraction });
    }
    Ok(())
}

/// spec.md §4.G.3: an attribute with no schema entry is treated as not
/// requiring a timed write, matching `requires_timed_interaction`'s only
/// caller (`validate`), which already rejected unknown clusters/endpoints
/// before this runs.
fn requires_timed_interaction(entry: &AttributeDataIn, schema: &dyn Schema) -> bool {
    schema.attribute_meta(entry.path.cluster, entry.path.attribute).is_some_and(|meta| meta.timed_write)
}

/// Applies one write and reports whether the stored value actually
/// changed, so the caller can fire `$Changed` only for attributes that
/// did (spec.md §4.G.3) rather than for every successful write.
fn apply_one(graph: &mut EndpointGraph, entry: &AttributeDataIn) -> bool {
    let Some(endpoint) = graph.get_mut(entry.path.endpoint) else { return false };
    let Some(cluster) = endpoint.clusters.get_mut(&entry.path.cluster) else { return false };
    match entry.list_op {
        ListOp::Replace => {
            let previous = cluster.attributes.insert(entry.path.attribute, entry.value.clone());
            previous.as_ref() != Some(&entry.value)
        }
        ListOp::Append => {
            let list = cluster.attributes.entry(entry.path.attribute).or_insert_with(|| OpaqueValue::Array(vec![]));
            if let OpaqueValue::Array(items) = list {
                items.push(entry.value.clone());
                true
            } else {
                false
            }
        }
        ListOp::Remove => {
            if let Some(OpaqueValue::Array(items)) = cluster.attributes.get_mut(&entry.path.attribute) {
                let before = items.len();
                items.retain(|item| item != &entry.value);
                before != items.len()
            } else {
                false
            }
        }
    }
}
