//! Subscription layer (spec.md §4.H, §4.G.5, §4.G.6): server-side
//! publishers driven by a dirty-set and a single timer wheel, and the
//! client-side sustained-subscription reconnect loop.

pub mod dirty;
pub mod reconnect;
pub mod server;

pub use dirty::DirtySet;
pub use reconnect::{run_sustained, AttemptOutcome, LivenessEvent, BACKOFF_FACTOR, INITIAL_INTERVAL, JITTER_FACTOR, MAXIMUM_INTERVAL};
pub use server::{ServerSubscription, SubscriptionManager, RESUBSCRIBE_SLACK};
