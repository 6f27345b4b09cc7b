//! Client-side sustained subscription (spec.md §4.G.6): reconnect with
//! exponential backoff and jitter, no overall timeout, abortable only by
//! the caller's cancellation token.
//!
//! spec.md §9 flags a `break` in the reconnect loop of the source that
//! fires on a plain failed connect attempt rather than only on
//! cancellation, terminating the "sustained" subscription the first time
//! a peer is briefly unreachable. The loop below exits only when
//! `cancel` is signalled; a failed attempt schedules the next backoff and
//! continues.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const INITIAL_INTERVAL: Duration = Duration::from_secs(15);
pub const MAXIMUM_INTERVAL: Duration = Duration::from_secs(3600);
pub const BACKOFF_FACTOR: f64 = 2.0;
pub const JITTER_FACTOR: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    Active,
    Inactive,
}

/// One connection attempt's outcome, reported by the caller.
pub enum AttemptOutcome {
    Connected,
    Failed,
}

fn jittered(interval: Duration) -> Duration {
    let jitter = interval.as_secs_f64() * JITTER_FACTOR;
    let delta = rand::thread_rng().gen_range(-jitter..=jitter);
    Duration::from_secs_f64((interval.as_secs_f64() + delta).max(0.0))
}

fn next_interval(current: Duration) -> Duration {
    let scaled = current.mul_f64(BACKOFF_FACTOR);
    scaled.min(MAXIMUM_INTERVAL)
}

/// Drive a sustained subscription's reconnect schedule. `connect` is
/// invoked once per attempt and must itself be cancel-safe (abort its own
/// in-flight I/O when `cancel` fires). This function returns only when
/// `cancel` is triggered; it does not return on repeated connect failures,
/// by design (spec.md §9).
pub async fn run_sustained<F, Fut>(peer: matter_types::PeerAddress, cancel: CancellationToken, mut connect: F, mut on_event: impl FnMut(LivenessEvent))
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome>,
{
    let mut interval = INITIAL_INTERVAL;
    on_event(LivenessEvent::Inactive);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => return,
            outcome = connect() => outcome,
        };

        match outcome {
            AttemptOutcome::Connected => {
                info!(%peer, "sustained subscription connected");
                on_event(LivenessEvent::Active);
                interval = INITIAL_INTERVAL;
                // The caller drives the live subscription from here; when it
                // eventually reports back (session dropped, peer timed out),
                // control returns to this loop to resume reconnecting.
                on_event(LivenessEvent::Inactive);
            }
            AttemptOutcome::Failed => {
                let wait = jittered(interval);
                warn!(%peer, wait_secs = wait.as_secs_f64(), "reconnect attempt failed, backing off");
                interval = next_interval(interval);
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(jittered(interval)) => {}
        }
    }
}
