//! Failsafe Context state machine (spec.md §4.I).

use crate::error::FailsafeError;
use crate::rollback::RollbackPlan;
use matter_types::FabricIndex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default window an `ArmFailSafe` opens (spec.md §4.I).
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(60);
/// Non-resettable ceiling on total armed time across one commissioning
/// session (spec.md §4.I: "Enforces `maxCumulativeFailsafe` (default
/// 900 s) via a second non-resettable timer").
pub const MAX_CUMULATIVE_FAILSAFE: Duration = Duration::from_secs(900);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeState {
    Disarmed,
    Armed,
    Expired,
}

/// The session kind a request arrived over, as far as the failsafe cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivedOver {
    Pase,
    Case,
}

pub struct FailsafeContext {
    state: FailsafeState,
    fabric: Option<FabricIndex>,
    expiry_at: Option<Instant>,
    /// Set on the very first arm of this commissioning session; never
    /// reset by a re-arm.
    cumulative_start: Option<Instant>,
    rollback: RollbackPlan,
}

impl Default for FailsafeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FailsafeContext {
    pub fn new() -> Self {
        FailsafeContext { state: FailsafeState::Disarmed, fabric: None, expiry_at: None, cumulative_start: None, rollback: RollbackPlan::new() }
    }

    pub fn state(&self) -> FailsafeState {
        self.state
    }

    pub fn armed_fabric(&self) -> Option<FabricIndex> {
        self.fabric
    }

    pub fn rollback_plan(&self) -> &RollbackPlan {
        &self.rollback
    }

    pub fn rollback_plan_mut(&mut self) -> &mut RollbackPlan {
        &mut self.rollback
    }

    /// `ArmFailSafe(expiry>0)`. Valid from `disarmed` (must arrive over
    /// PASE, or over CASE for an already-armed commissioning window — i.e.
    /// this same check also re-arms) or from `armed` on the same fabric.
    pub fn arm(&mut self, fabric: FabricIndex, expiry: Duration, arrived_over: ArrivedOver, now: Instant) -> Result<(), FailsafeError> {
        match self.state {
            FailsafeState::Disarmed | FailsafeState::Expired => {
                if arrived_over == ArrivedOver::Case {
                    return Err(FailsafeError::RequiresPaseOrArmedCase);
                }
                self.begin_cumulative_budget(now)?;
                self.state = FailsafeState::Armed;
                self.fabric = Some(fabric);
                self.expiry_at = Some(now + expiry);
                self.rollback = RollbackPlan::new();
                info!(fabric = fabric.value(), expiry_secs = expiry.as_secs(), "failsafe armed");
                Ok(())
            }
            FailsafeState::Armed => {
                let armed_fabric = self.fabric.expect("armed state always carries a fabric");
                if armed_fabric != fabric {
                    return Err(FailsafeError::ArmedForDifferentFabric { armed: armed_fabric.value(), requested: fabric.value() });
                }
                self.begin_cumulative_budget(now)?;
                self.expiry_at = Some(now + expiry);
                info!(fabric = fabric.value(), expiry_secs = expiry.as_secs(), "failsafe re-armed");
                Ok(())
            }
        }
    }

    fn begin_cumulative_budget(&mut self, now: Instant) -> Result<(), FailsafeError> {
        let start = *self.cumulative_start.get_or_insert(now);
        if now.duration_since(start) >= MAX_CUMULATIVE_FAILSAFE {
            return Err(FailsafeError::CumulativeBudgetExhausted { limit_secs: MAX_CUMULATIVE_FAILSAFE.as_secs() });
        }
        Ok(())
    }

    /// `ArmFailSafe(expiry=0)` from the armed fabric, or the expiry timer
    /// firing: both move straight to `expired` and hand back the rollback
    /// plan for the caller to execute.
    pub fn expire(&mut self) -> Result<RollbackPlan, FailsafeError> {
        if self.state != FailsafeState::Armed {
            return Err(FailsafeError::NotArmed);
        }
        warn!(fabric = self.fabric.map(FabricIndex::value), "failsafe expired, rolling back");
        self.state = FailsafeState::Expired;
        self.expiry_at = None;
        Ok(std::mem::take(&mut self.rollback))
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.state == FailsafeState::Armed && self.expiry_at.is_some_and(|at| now >= at)
    }

    /// `CommissioningComplete`. Must arrive over CASE, accessing the armed
    /// fabric.
    pub fn disarm(&mut self, accessing_fabric: FabricIndex, arrived_over: ArrivedOver) -> Result<(), FailsafeError> {
        if arrived_over != ArrivedOver::Case {
            return Err(FailsafeError::RequiresCase);
        }
        let FailsafeState::Armed = self.state else {
            return Err(FailsafeError::NotArmed);
        };
        let armed_fabric = self.fabric.expect("armed state always carries a fabric");
        if armed_fabric != accessing_fabric {
            return Err(FailsafeError::FabricMismatch { accessing: accessing_fabric.value(), armed: armed_fabric.value() });
        }
        self.state = FailsafeState::Disarmed;
        self.fabric = None;
        self.expiry_at = None;
        self.rollback = RollbackPlan::new();
        info!(fabric = accessing_fabric.value(), "commissioning complete, failsafe disarmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric() -> FabricIndex {
        FabricIndex::new(1).unwrap()
    }

    #[test]
    fn arm_from_disarmed_requires_pase() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        assert!(matches!(ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Case, now), Err(FailsafeError::RequiresPaseOrArmedCase)));
        assert!(ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, now).is_ok());
        assert_eq!(ctx.state(), FailsafeState::Armed);
    }

    #[test]
    fn re_arm_on_a_different_fabric_is_rejected() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, now).unwrap();
        let other = FabricIndex::new(2).unwrap();
        let err = ctx.arm(other, DEFAULT_EXPIRY, ArrivedOver::Case, now).unwrap_err();
        assert!(matches!(err, FailsafeError::ArmedForDifferentFabric { .. }));
    }

    #[test]
    fn commissioning_complete_over_pase_is_rejected() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, now).unwrap();
        assert!(matches!(ctx.disarm(fabric(), ArrivedOver::Pase), Err(FailsafeError::RequiresCase)));
    }

    #[test]
    fn commissioning_complete_disarms_and_returns_to_idle() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, now).unwrap();
        ctx.disarm(fabric(), ArrivedOver::Case).unwrap();
        assert_eq!(ctx.state(), FailsafeState::Disarmed);
        assert!(ctx.armed_fabric().is_none());
    }

    #[test]
    fn expiry_yields_the_accumulated_rollback_plan() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, now).unwrap();
        ctx.rollback_plan_mut().record_fabric_added(fabric());
        ctx.rollback_plan_mut().record_commissioning_window_open();

        let plan = ctx.expire().unwrap();
        assert_eq!(plan.fabric_added, Some(fabric()));
        assert!(plan.commissioning_window_open);
        assert_eq!(ctx.state(), FailsafeState::Expired);
    }

    #[test]
    fn is_due_fires_only_once_expiry_has_passed() {
        let mut ctx = FailsafeContext::new();
        let now = Instant::now();
        ctx.arm(fabric(), Duration::from_millis(10), ArrivedOver::Pase, now).unwrap();
        assert!(!ctx.is_due(now));
        assert!(ctx.is_due(now + Duration::from_millis(11)));
    }

    #[test]
    fn cumulative_budget_is_not_reset_by_re_arming() {
        let mut ctx = FailsafeContext::new();
        let start = Instant::now();
        ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Pase, start).unwrap();
        let past_budget = start + MAX_CUMULATIVE_FAILSAFE + Duration::from_secs(1);
        let err = ctx.arm(fabric(), DEFAULT_EXPIRY, ArrivedOver::Case, past_budget).unwrap_err();
        assert!(matches!(err, FailsafeError::CumulativeBudgetExhausted { .. }));
    }
}
