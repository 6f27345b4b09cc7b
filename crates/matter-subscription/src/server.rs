//! Server-side publishers (spec.md §4.H): one per accepted subscription,
//! scheduled off a single timer wheel per node.

use crate::dirty::DirtySet;
use matter_types::{ConcreteAttributePath, ConcreteEventPath, EventPriority, Handle, PeerAddress};
use matter_session::Session;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Peer must ack within `maxInterval + RESUBSCRIBE_SLACK` or the
/// subscription is declared dead (spec.md §4.G.5).
pub const RESUBSCRIBE_SLACK: Duration = Duration::from_secs(2);

pub struct ServerSubscription {
    pub subscription_id: u32,
    pub session: Handle<Session>,
    pub peer: PeerAddress,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub dirty: DirtySet,
    pub last_report_at: Instant,
    pub last_ack_at: Instant,
    pub fabric_filtered: bool,
}

impl ServerSubscription {
    /// Earliest the next report may fire; never before `minInterval` after
    /// the last report (spec.md §4.G.5: "a report is emitted no earlier
    /// than minInterval after the previous report").
    fn next_allowed_at(&self) -> Instant {
        self.last_report_at + self.min_interval
    }

    /// Latest the next report must fire even with nothing new dirty
    /// (keepalive within `maxInterval`).
    fn next_deadline_at(&self) -> Instant {
        self.last_report_at + self.max_interval
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_ack_at) > self.max_interval + RESUBSCRIBE_SLACK
    }

    /// When this subscription next needs the manager's attention: as soon
    /// as `minInterval` allows if something is dirty, otherwise at the
    /// `maxInterval` keepalive deadline.
    fn next_due_at(&self) -> Instant {
        if self.dirty.is_empty() {
            self.next_deadline_at()
        } else {
            self.next_allowed_at()
        }
    }

    pub fn mark_attribute_dirty(&mut self, path: ConcreteAttributePath) {
        self.dirty.mark_attribute(path);
    }

    pub fn mark_event_dirty(&mut self, path: ConcreteEventPath, priority: EventPriority, event_number: u64) {
        self.dirty.mark_event(path, priority, event_number);
    }
}

/// Single timer wheel for every subscription on this node (spec.md §4.H:
/// "a single timer wheel per node; each subscription computes its
/// next-due time; the manager sleeps until the soonest-due moment").
#[derive(Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<u32, ServerSubscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: ServerSubscription) {
        self.subscriptions.insert(subscription.subscription_id, subscription);
    }

    pub fn remove(&mut self, subscription_id: u32) -> Option<ServerSubscription> {
        self.subscriptions.remove(&subscription_id)
    }

    /// `keepSubscriptions=false` cancels every prior subscription from the
    /// same peer on accept (spec.md §4.G.5).
    pub fn cancel_all_from_peer(&mut self, peer: PeerAddress) -> Vec<u32> {
        let ids: Vec<u32> = self.subscriptions.values().filter(|s| s.peer == peer).map(|s| s.subscription_id).collect();
        for id in &ids {
            self.subscriptions.remove(id);
        }
        ids
    }

    pub fn get_mut(&mut self, subscription_id: u32) -> Option<&mut ServerSubscription> {
        self.subscriptions.get_mut(&subscription_id)
    }

    /// Every live subscription, for attribute/event writes that need to
    /// mark themselves dirty against all current subscribers rather than
    /// one specific subscription id.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut ServerSubscription)> {
        self.subscriptions.iter_mut().map(|(id, sub)| (*id, sub))
    }

    /// The soonest instant any subscription needs servicing, i.e. what the
    /// manager's single timer wheel should sleep until.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.subscriptions.values().map(ServerSubscription::next_due_at).min()
    }

    /// Subscriptions whose next-due time has arrived (or whose peer has
    /// gone silent past the liveness deadline).
    pub fn due_at(&self, now: Instant) -> (Vec<u32>, Vec<u32>) {
        let mut ready = Vec::new();
        let mut timed_out = Vec::new();
        for sub in self.subscriptions.values() {
            if sub.is_timed_out(now) {
                timed_out.push(sub.subscription_id);
            } else if sub.next_due_at() <= now {
                ready.push(sub.subscription_id);
            }
        }
        ready.sort_unstable();
        timed_out.sort_unstable();
        (ready, timed_out)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_types::{Arena, AttributeId, ClusterId, EndpointId, FabricIndex, NodeId};

    fn fake_session() -> Handle<Session> {
        let mut arena: Arena<Session> = Arena::new();
        arena.insert(Session::new(
            matter_session::SessionKind::Case,
            1,
            1,
            Some(NodeId(1)),
            Some(FabricIndex::new(1).unwrap()),
            [0; 16],
            [0; 16],
            [0; 32],
            1,
            matter_session::OUR_DEFAULTS,
        ))
    }

    fn peer() -> PeerAddress {
        PeerAddress::new(FabricIndex::new(1).unwrap(), NodeId(1))
    }

    fn make_sub(id: u32, now: Instant, min: Duration, max: Duration) -> ServerSubscription {
        ServerSubscription {
            subscription_id: id,
            session: fake_session(),
            peer: peer(),
            min_interval: min,
            max_interval: max,
            dirty: DirtySet::new(),
            last_report_at: now,
            last_ack_at: now,
            fabric_filtered: false,
        }
    }

    #[test]
    fn dirty_subscription_becomes_due_after_min_interval() {
        let now = Instant::now();
        let mut manager = SubscriptionManager::new();
        let mut sub = make_sub(1, now, Duration::from_millis(100), Duration::from_secs(60));
        sub.mark_attribute_dirty(ConcreteAttributePath { endpoint: EndpointId(1), cluster: ClusterId(6), attribute: AttributeId(0) });
        manager.insert(sub);

        let (ready, _timed_out) = manager.due_at(now);
        assert!(ready.is_empty(), "must not fire before minInterval");
        let (ready, _) = manager.due_at(now + Duration::from_millis(150));
        assert_eq!(ready, vec![1]);
    }

    #[test]
    fn clean_subscription_is_due_only_at_max_interval_keepalive() {
        let now = Instant::now();
        let mut manager = SubscriptionManager::new();
        manager.insert(make_sub(2, now, Duration::from_millis(0), Duration::from_secs(1)));
        let (ready, _) = manager.due_at(now + Duration::from_millis(500));
        assert!(ready.is_empty());
        let (ready, _) = manager.due_at(now + Duration::from_secs(2));
        assert_eq!(ready, vec![2]);
    }

    #[test]
    fn silent_peer_is_reported_as_timed_out_within_max_interval_plus_slack() {
        let now = Instant::now();
        let mut manager = SubscriptionManager::new();
        manager.insert(make_sub(3, now, Duration::from_millis(0), Duration::from_secs(1)));
        let (_, timed_out) = manager.due_at(now + Duration::from_secs(1) + RESUBSCRIBE_SLACK + Duration::from_millis(1));
        assert_eq!(timed_out, vec![3]);
    }

    #[test]
    fn keep_subscriptions_false_cancels_every_prior_subscription_from_peer() {
        let now = Instant::now();
        let mut manager = SubscriptionManager::new();
        manager.insert(make_sub(1, now, Duration::from_secs(0), Duration::from_secs(60)));
        manager.insert(make_sub(2, now, Duration::from_secs(0), Duration::from_secs(60)));
        let cancelled = manager.cancel_all_from_peer(peer());
        assert_eq!(cancelled.len(), 2);
        assert!(manager.is_empty());
    }
}
