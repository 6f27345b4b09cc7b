//! Per-exchange MRP bookkeeping (spec.md §3 "MRP State (per exchange)"):
//! the `unacked` retransmit queue and the standalone-ack scheduling
//! heuristic. Pure state + `Instant` math — the actual timer driving
//! (`tokio::time::sleep`) lives in the exchange actor that owns this.

use crate::dedup::DedupWindow;
use crate::error::MrpError;
use crate::policy::{self, MAX_ATTEMPTS};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Unacked {
    payload: Vec<u8>,
    retransmission_count: u8,
    next_fire_at: Instant,
}

/// MRP state for one exchange's outbound-reliable and inbound-ack-scheduling
/// needs. One instance per `Exchange` (spec.md §3).
pub struct MrpState {
    base_interval: Duration,
    unacked: HashMap<u32, Unacked>,
    standalone_ack_due_at: Option<Instant>,
    last_acked_peer_counter: Option<u32>,
    peer_ack_window: DedupWindow,
}

impl MrpState {
    pub fn new(base_interval: Duration) -> Self {
        MrpState {
            base_interval,
            unacked: HashMap::new(),
            standalone_ack_due_at: None,
            last_acked_peer_counter: None,
            peer_ack_window: DedupWindow::new(),
        }
    }

    /// Register a just-sent reliable message, scheduling its first
    /// retransmit per the §4.C backoff schedule.
    pub fn register_send(&mut self, message_id: u32, payload: Vec<u8>, now: Instant, jitter: f64) {
        let delay = policy::retransmit_timeout(self.base_interval, 0, jitter);
        self.unacked.insert(
            message_id,
            Unacked { payload, retransmission_count: 0, next_fire_at: now + delay },
        );
    }

    /// The peer acknowledged `message_id`: drop it from the retransmit
    /// queue. Returns `true` if it was actually outstanding.
    pub fn on_ack(&mut self, message_id: u32) -> bool {
        self.unacked.remove(&message_id).is_some()
    }

    /// Record that we have sent an ack covering `peer_counter`, to drive
    /// `peerAckWindow` out-of-order tracking on *our* ack stream.
    pub fn note_peer_counter_acked(&mut self, peer_counter: u32) -> bool {
        self.last_acked_peer_counter = Some(peer_counter);
        self.peer_ack_window.observe(peer_counter)
    }

    pub fn last_acked_peer_counter(&self) -> Option<u32> {
        self.last_acked_peer_counter
    }

    /// Messages whose retransmit timer has fired by `now`. Each returned
    /// entry's attempt counter is bumped and its next fire time
    /// rescheduled; entries that exhaust [`MAX_ATTEMPTS`] are removed and
    /// reported as errors instead.
    pub fn due_retransmits(&mut self, now: Instant, jitter: f64) -> Vec<(u32, Result<Vec<u8>, MrpError>)> {
        let due_ids: Vec<u32> = self
            .unacked
            .iter()
            .filter(|(_, entry)| entry.next_fire_at <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut results = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            let entry = self.unacked.get_mut(&id).expect("id came from this map");
            entry.retransmission_count += 1;
            if entry.retransmission_count >= MAX_ATTEMPTS {
                self.unacked.remove(&id);
                results.push((id, Err(MrpError::MaxRetransmit { attempts: MAX_ATTEMPTS })));
            } else {
                let delay = policy::retransmit_timeout(self.base_interval, entry.retransmission_count as u32, jitter);
                entry.next_fire_at = now + delay;
                results.push((id, Ok(entry.payload.clone())));
            }
        }
        results
    }

    pub fn next_due_at(&self) -> Option<Instant> {
        self.unacked.values().map(|e| e.next_fire_at).min()
    }

    pub fn outstanding_count(&self) -> usize {
        self.unacked.len()
    }

    /// Arm the standalone-ack timer for an inbound message that requested
    /// one, unless an ack is already pending (spec.md §4.C).
    pub fn schedule_standalone_ack(&mut self, now: Instant) {
        if self.standalone_ack_due_at.is_none() {
            self.standalone_ack_due_at = Some(now + policy::STANDALONE_ACK_TIMEOUT);
        }
    }

    /// A response is being sent that can piggyback the pending ack:
    /// cancel the standalone timer.
    pub fn cancel_standalone_ack(&mut self) {
        self.standalone_ack_due_at = None;
    }

    pub fn standalone_ack_due_at(&self) -> Option<Instant> {
        self.standalone_ack_due_at
    }

    pub fn take_due_standalone_ack(&mut self, now: Instant) -> bool {
        match self.standalone_ack_due_at {
            Some(due) if due <= now => {
                self.standalone_ack_due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Exchange is closing (spec.md §4.C): drop all retransmit timers. If a
    /// standalone ack was still pending, it must be sent immediately — the
    /// caller is responsible for actually sending it; this just reports
    /// whether one was pending and clears the state.
    pub fn cancel_all(&mut self) -> bool {
        self.unacked.clear();
        self.standalone_ack_due_at.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_before_any_retransmit_clears_the_entry() {
        let mut state = MrpState::new(Duration::from_millis(300));
        let now = Instant::now();
        state.register_send(1, b"hello".to_vec(), now, 0.0);
        assert_eq!(state.outstanding_count(), 1);
        assert!(state.on_ack(1));
        assert_eq!(state.outstanding_count(), 0);
    }

    #[test]
    fn acking_unknown_message_id_is_a_noop() {
        let mut state = MrpState::new(Duration::from_millis(300));
        assert!(!state.on_ack(999));
    }

    #[test]
    fn retransmit_fires_then_eventually_exhausts_budget() {
        let mut state = MrpState::new(Duration::from_millis(10));
        let mut now = Instant::now();
        state.register_send(7, b"payload".to_vec(), now, 0.0);

        let mut failed = false;
        for _ in 0..(MAX_ATTEMPTS as usize + 2) {
            now += Duration::from_secs(5);
            for (_id, result) in state.due_retransmits(now, 0.0) {
                if result.is_err() {
                    failed = true;
                }
            }
            if failed {
                break;
            }
        }
        assert!(failed, "should eventually exhaust the retransmit budget");
        assert_eq!(state.outstanding_count(), 0);
    }

    #[test]
    fn standalone_ack_is_not_rearmed_while_pending() {
        let mut state = MrpState::new(Duration::from_millis(300));
        let now = Instant::now();
        state.schedule_standalone_ack(now);
        let first_due = state.standalone_ack_due_at().unwrap();
        state.schedule_standalone_ack(now + Duration::from_millis(50));
        assert_eq!(state.standalone_ack_due_at(), Some(first_due));
    }

    #[test]
    fn piggyback_cancels_the_pending_standalone_ack() {
        let mut state = MrpState::new(Duration::from_millis(300));
        state.schedule_standalone_ack(Instant::now());
        state.cancel_standalone_ack();
        assert!(state.standalone_ack_due_at().is_none());
    }

    #[test]
    fn cancel_all_reports_and_clears_a_pending_ack() {
        let mut state = MrpState::new(Duration::from_millis(300));
        state.register_send(1, b"x".to_vec(), Instant::now(), 0.0);
        state.schedule_standalone_ack(Instant::now());
        assert!(state.cancel_all());
        assert_eq!(state.outstanding_count(), 0);
        assert!(state.standalone_ack_due_at().is_none());
        assert!(!state.cancel_all(), "nothing pending on a second close");
    }
}
