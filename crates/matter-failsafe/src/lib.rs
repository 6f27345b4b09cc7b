//! Failsafe Context (spec.md §4.I): the time-bounded commissioning
//! window that rolls back on expiry.

pub mod error;
pub mod rollback;
pub mod state;

pub use error::FailsafeError;
pub use rollback::RollbackPlan;
pub use state::{ArrivedOver, FailsafeContext, FailsafeState, DEFAULT_EXPIRY, MAX_CUMULATIVE_FAILSAFE};
