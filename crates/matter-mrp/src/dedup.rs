//! Sliding-window message-counter deduplication (spec.md §4.C: "Deduplicate
//! by (peerCounter, peerNodeId)"). One `DedupWindow` is kept per peer
//! counter space — callers key a `DedupWindow` per `(session, peerNodeId)`
//! for unicast, or per `(groupId, source)` for group sessions.

/// Width of the trailing bitmask tracked behind `highest_seen`.
const WINDOW_BITS: u32 = 32;

#[derive(Debug, Clone)]
pub struct DedupWindow {
    highest_seen: Option<u32>,
    /// Bit `k` (0-indexed) set means `highest_seen - (k+1)` has been seen.
    seen_before_highest: u32,
}

impl Default for DedupWindow {
    fn default() -> Self {
        DedupWindow { highest_seen: None, seen_before_highest: 0 }
    }
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `counter`, returning `true` if it is new (should be delivered
    /// to the handler) or `false` if it is a retransmit duplicate.
    pub fn observe(&mut self, counter: u32) -> bool {
        let Some(highest) = self.highest_seen else {
            self.highest_seen = Some(counter);
            return true;
        };

        if counter == highest {
            return false;
        }

        // Wrapping-aware "is counter ahead of highest" check: valid Matter
        // counters only ever move forward (mod 2^32), so a huge backward
        // jump is treated as a new high-water mark rather than ancient
        // history, matching reference MRP behavior across counter wrap.
        let forward_distance = counter.wrapping_sub(highest);
        let is_ahead = forward_distance != 0 && forward_distance < (1 << 31);

        if is_ahead {
            let shift = forward_distance;
            self.seen_before_highest = if shift >= WINDOW_BITS {
                0
            } else {
                (self.seen_before_highest << shift) | (1 << (shift - 1))
            };
            self.highest_seen = Some(counter);
            true
        } else {
            let behind = highest.wrapping_sub(counter);
            if behind == 0 || behind > WINDOW_BITS {
                // Out of tracked window: conservatively treat as new so a
                // legitimate very-late message is not silently eaten, the
                // peer's own retransmit cap bounds how stale this can be.
                return behind > WINDOW_BITS;
            }
            let bit = 1u32 << (behind - 1);
            let already_seen = self.seen_before_highest & bit != 0;
            self.seen_before_highest |= bit;
            !already_seen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_counter_is_always_new() {
        let mut window = DedupWindow::new();
        assert!(window.observe(42));
    }

    #[test]
    fn exact_retransmit_is_deduplicated() {
        let mut window = DedupWindow::new();
        assert!(window.observe(10));
        assert!(!window.observe(10));
    }

    #[test]
    fn out_of_order_then_duplicate_is_caught() {
        let mut window = DedupWindow::new();
        assert!(window.observe(10));
        assert!(window.observe(12));
        assert!(window.observe(11), "11 arriving after 12 is new");
        assert!(!window.observe(11), "re-delivery of 11 is a duplicate");
        assert!(!window.observe(12));
    }

    #[test]
    fn strictly_ascending_stream_is_never_flagged_as_duplicate() {
        let mut window = DedupWindow::new();
        for counter in 1..200u32 {
            assert!(window.observe(counter), "counter {counter} should be new");
        }
    }
}
