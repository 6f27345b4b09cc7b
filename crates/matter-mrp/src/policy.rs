//! Retransmit timeout schedule (spec.md §4.C):
//!
//! `T(n) = baseInterval · MARGIN · BASE^max(0, n−THRESHOLD) · (1 + jitter·JITTER)`
//!
//! `baseInterval` is the peer's announced `idleInterval` (peer has been
//! silent) or `activeInterval` (peer has sent something recently within the
//! session's activity window) — the caller picks which, per spec.md §4.D.4.

use std::time::Duration;

pub const MARGIN: f64 = 1.1;
pub const BASE: f64 = 1.6;
pub const JITTER: f64 = 0.25;
pub const THRESHOLD: u32 = 1;
pub const MAX_ATTEMPTS: u8 = 5;

pub const STANDALONE_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// Default per-message processing allowance folded into the peer-response
/// deadline (spec.md §4.C).
pub const DEFAULT_PROCESSING_TIME: Duration = Duration::from_secs(2);
pub const PEER_RESPONSE_BUFFER: Duration = Duration::from_secs(5);

/// Compute `T(n)` for retransmission attempt `n` (0-indexed: `n=0` is the
/// delay before the *first* retransmit, i.e. after the initial send).
/// `jitter` must be in `[0, 1)`.
pub fn retransmit_timeout(base_interval: Duration, attempt: u32, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(THRESHOLD);
    let backoff = BASE.powi(exponent as i32);
    let jitter_factor = 1.0 + jitter.clamp(0.0, 1.0) * JITTER;
    let seconds = base_interval.as_secs_f64() * MARGIN * backoff * jitter_factor;
    Duration::from_secs_f64(seconds)
}

/// Sum of worst-case retransmit cycles in each direction plus processing
/// time plus a fixed buffer (spec.md §4.C "Peer-response deadline").
pub fn peer_response_deadline(base_interval: Duration) -> Duration {
    let mut one_direction = Duration::ZERO;
    for attempt in 0..u32::from(MAX_ATTEMPTS) {
        one_direction += retransmit_timeout(base_interval, attempt, 1.0);
    }
    one_direction * 2 + DEFAULT_PROCESSING_TIME + PEER_RESPONSE_BUFFER
}
