//! Dirty-set tracking (spec.md §4.H): "Any write of the cluster on a
//! matching path inserts into every matching subscription's dirty set."
//! events are ranked Critical > Info > Debug, then by event number.

use matter_types::{ConcreteAttributePath, ConcreteEventPath, EventPriority};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DirtyEvent {
    /// Reversed so a `BTreeSet`'s ascending iteration yields highest
    /// priority first (`Critical` sorts last in `EventPriority`'s
    /// derived `Ord`, so invert it here).
    priority_rank: u8,
    event_number: u64,
    path: EventPathKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventPathKey {
    endpoint: u16,
    cluster: u32,
    event: u32,
}

fn priority_rank(priority: EventPriority) -> u8 {
    match priority {
        EventPriority::Critical => 0,
        EventPriority::Info => 1,
        EventPriority::Debug => 2,
    }
}

#[derive(Debug, Default)]
pub struct DirtySet {
    attributes: BTreeSet<(u16, u32, u32)>,
    events: BTreeSet<DirtyEvent>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_attribute(&mut self, path: ConcreteAttributePath) {
        self.attributes.insert((path.endpoint.value(), path.cluster.value(), path.attribute.value()));
    }

    pub fn mark_event(&mut self, path: ConcreteEventPath, priority: EventPriority, event_number: u64) {
        self.events.insert(DirtyEvent {
            priority_rank: priority_rank(priority),
            event_number,
            path: EventPathKey { endpoint: path.endpoint.value(), cluster: path.cluster.value(), event: path.event.value() },
        });
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.events.is_empty()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Drain events in delivery order: Critical before Info before Debug,
    /// then ascending event number within a priority tier.
    pub fn drain_events_in_priority_order(&mut self) -> Vec<(u16, u32, u32)> {
        std::mem::take(&mut self.events).into_iter().map(|e| (e.path.endpoint, e.path.cluster, e.path.event)).collect()
    }

    pub fn drain_attributes(&mut self) -> Vec<(u16, u32, u32)> {
        std::mem::take(&mut self.attributes).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_types::{AttributeId, ClusterId, EndpointId, EventId};

    #[test]
    fn events_are_ordered_critical_first_then_by_event_number() {
        let mut dirty = DirtySet::new();
        let p = ConcreteEventPath { endpoint: EndpointId(1), cluster: ClusterId(6), event: EventId(0) };
        dirty.mark_event(p, EventPriority::Debug, 5);
        dirty.mark_event(ConcreteEventPath { event: EventId(1), ..p }, EventPriority::Critical, 1);
        dirty.mark_event(ConcreteEventPath { event: EventId(2), ..p }, EventPriority::Info, 2);

        let ordered = dirty.drain_events_in_priority_order();
        assert_eq!(ordered[0].2, 1); // Critical (event id 1) first
        assert_eq!(ordered[1].2, 2); // Info next
        assert_eq!(ordered[2].2, 0); // Debug last
    }

    #[test]
    fn repeated_marks_on_different_attributes_all_survive() {
        let mut dirty = DirtySet::new();
        let p = ConcreteAttributePath { endpoint: EndpointId(1), cluster: ClusterId(6), attribute: AttributeId(0) };
        dirty.mark_attribute(p);
        dirty.mark_attribute(ConcreteAttributePath { attribute: AttributeId(1), ..p });
        dirty.mark_attribute(ConcreteAttributePath { attribute: AttributeId(2), ..p });
        assert_eq!(dirty.attribute_count(), 3, "each mark must survive, not be erased by the next");
    }

    #[test]
    fn mark_attribute_dedups_repeated_marks() {
        let mut dirty = DirtySet::new();
        let p = ConcreteAttributePath { endpoint: EndpointId(1), cluster: ClusterId(6), attribute: AttributeId(0) };
        dirty.mark_attribute(p);
        dirty.mark_attribute(p);
        assert_eq!(dirty.attribute_count(), 1);
    }
}
