//! Endpoint-0 commissioning commands (General Commissioning and
//! Operational Credentials clusters): `ArmFailSafe`, `AddNOC`,
//! `CommissioningComplete`. These three are special-cased in
//! [`crate::interaction`] rather than routed through
//! `matter_interaction::invoke`'s generic [`matter_interaction::CommandHandler`]
//! seam, because they need session context (which fabric/session-kind the
//! request arrived over) that `CommandHandler::invoke` has no parameter for.

use matter_failsafe::{ArrivedOver, FailsafeContext, RollbackPlan};
use matter_fabric::{FabricRegistry, NewFabric};
use matter_interaction::ImStatus;
use matter_types::{ClusterId, CommandId, FabricIndex, NodeId, VendorId};
use std::time::{Duration, Instant};
use tracing::warn;

pub const GENERAL_COMMISSIONING_CLUSTER: ClusterId = ClusterId(0x0030);
pub const OPERATIONAL_CREDENTIALS_CLUSTER: ClusterId = ClusterId(0x003E);

pub mod general_commissioning_command {
    use matter_types::CommandId;
    pub const ARM_FAIL_SAFE: CommandId = CommandId(0x00);
    pub const COMMISSIONING_COMPLETE: CommandId = CommandId(0x04);
}

pub mod operational_credentials_command {
    use matter_types::CommandId;
    pub const ADD_NOC: CommandId = CommandId(0x06);
}

/// Fabric index the failsafe arms onto before `AddNOC` has run. A real
/// implementation tracks "no fabric yet" as a distinct failsafe state;
/// `matter_failsafe::FailsafeContext::arm` requires a concrete
/// `FabricIndex` instead (spec.md §9's fabric-index space starts at 1), so
/// this node uses the lowest allocatable index as its provisional arming
/// target — which is also the index `AddNOC` will actually allocate for a
/// freshly-commissioned single-fabric node, so the two agree in the
/// common case this demo exercises.
pub const PROVISIONAL_FABRIC_INDEX: FabricIndex = match FabricIndex::new(1) {
    Some(index) => index,
    None => unreachable!(),
};

pub fn is_commissioning_path(cluster: ClusterId, command: CommandId) -> bool {
    (cluster == GENERAL_COMMISSIONING_CLUSTER
        && (command == general_commissioning_command::ARM_FAIL_SAFE || command == general_commissioning_command::COMMISSIONING_COMPLETE))
        || (cluster == OPERATIONAL_CREDENTIALS_CLUSTER && command == operational_credentials_command::ADD_NOC)
}

/// `ArmFailSafe(expiryLengthSeconds)` (spec.md §4.I). `expiry == 0` from an
/// already-armed fabric disarms immediately instead of (re-)arming, and the
/// resulting rollback plan is executed against `fabrics` right away rather
/// than waiting for the next timer tick.
pub fn arm_fail_safe(
    failsafe: &mut FailsafeContext,
    fabrics: &FabricRegistry,
    expiry_seconds: u16,
    arrived_over: ArrivedOver,
    now: Instant,
) -> Result<(), ImStatus> {
    if expiry_seconds == 0 {
        let plan = failsafe.expire().map_err(|_| ImStatus::Failure)?;
        execute_rollback(&plan, fabrics);
        Ok(())
    } else {
        let fabric = failsafe.armed_fabric().unwrap_or(PROVISIONAL_FABRIC_INDEX);
        failsafe
            .arm(fabric, Duration::from_secs(u64::from(expiry_seconds)), arrived_over, now)
            .map_err(|_| ImStatus::FailsafeRequired)
    }
}

/// Undo whatever an expiring failsafe context accumulated (spec.md §4.I:
/// "On expire roll back: delete any fabric added under this context,
/// restore prior regulatory config, close commissioning window, clear
/// temporary ACL entries"). This demo only ever records `fabric_added` (see
/// [`add_noc`]) — no code path here sets a regulatory config, reopens a
/// closed commissioning window, or grants a temporary ACL entry — so only
/// that field has anything to roll back; the others are asserted empty
/// rather than silently ignored.
pub fn execute_rollback(plan: &RollbackPlan, fabrics: &FabricRegistry) {
    if let Some(fabric) = plan.fabric_added {
        if let Err(error) = fabrics.remove_fabric(fabric) {
            warn!(%error, fabric_index = fabric.value(), "failsafe rollback: fabric already gone");
        }
    }
    debug_assert!(plan.prior_regulatory_config.is_none(), "regulatory config rollback has no executor yet");
    debug_assert!(!plan.commissioning_window_open, "commissioning window rollback has no executor yet");
    debug_assert!(plan.temporary_acl_entries.is_empty(), "temporary ACL rollback has no executor yet");
}

/// `AddNOC(nocValue, icacValue, ipkValue, caseAdminSubject, adminVendorId)`
/// (spec.md §4.E commit path), simplified: this demo trusts the caller's
/// claimed node id and issues the NOC/RCAC itself via
/// [`crate::identity::NodeIdentity`] rather than receiving a CSR-signed
/// certificate from the commissioner, since CSR issuance is outside this
/// workspace's scope (spec.md §1, `CertificateVerifier` seam).
#[allow(clippy::too_many_arguments)]
pub fn add_noc(
    registry: &FabricRegistry,
    failsafe: &mut FailsafeContext,
    fabric_id: u64,
    vendor_id: VendorId,
    node_id: NodeId,
    epoch_key: [u8; 16],
    noc: Vec<u8>,
    rcac: Vec<u8>,
) -> Result<FabricIndex, ImStatus> {
    if failsafe.state() != matter_failsafe::FailsafeState::Armed {
        return Err(ImStatus::FailsafeRequired);
    }
    let new_fabric = NewFabric { fabric_id, root_public_key: rcac.clone(), root_vendor_id: vendor_id, node_id, epoch_key, noc, icac: None, rcac, label: "commissioned".to_owned() };
    let index = registry.add_fabric(new_fabric).map_err(|_| ImStatus::Failure)?;
    failsafe.rollback_plan_mut().record_fabric_added(index);
    Ok(index)
}

/// `CommissioningComplete()` (spec.md §4.I): must arrive over CASE on the
/// fabric the failsafe is currently armed for.
pub fn commissioning_complete(failsafe: &mut FailsafeContext, fabric: FabricIndex, arrived_over: ArrivedOver) -> Result<(), ImStatus> {
    failsafe.disarm(fabric, arrived_over).map_err(|_| ImStatus::Failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_fabric::store::MemoryFabricStore;
    use std::sync::Arc;

    #[test]
    fn full_commissioning_sequence_arms_adds_noc_and_completes() {
        let mut failsafe = FailsafeContext::new();
        let registry = FabricRegistry::load(Arc::new(MemoryFabricStore::new())).unwrap();
        let now = Instant::now();

        arm_fail_safe(&mut failsafe, &registry, 60, ArrivedOver::Pase, now).unwrap();
        let index = add_noc(&registry, &mut failsafe, 1, VendorId(0xFFF1), NodeId(42), [9u8; 16], vec![1, 2, 3], vec![9]).unwrap();
        assert_eq!(index.value(), 1);
        commissioning_complete(&mut failsafe, index, ArrivedOver::Case).unwrap();
        assert_eq!(failsafe.state(), matter_failsafe::FailsafeState::Disarmed);
    }

    #[test]
    fn add_noc_without_armed_failsafe_is_rejected() {
        let mut failsafe = FailsafeContext::new();
        let registry = FabricRegistry::load(Arc::new(MemoryFabricStore::new())).unwrap();
        let err = add_noc(&registry, &mut failsafe, 1, VendorId(0xFFF1), NodeId(1), [1u8; 16], vec![1], vec![1]).unwrap_err();
        assert_eq!(err, ImStatus::FailsafeRequired);
    }

    #[test]
    fn arming_with_expiry_zero_rolls_back_the_fabric_added_under_this_window() {
        let mut failsafe = FailsafeContext::new();
        let registry = FabricRegistry::load(Arc::new(MemoryFabricStore::new())).unwrap();
        let now = Instant::now();

        arm_fail_safe(&mut failsafe, &registry, 60, ArrivedOver::Pase, now).unwrap();
        let index = add_noc(&registry, &mut failsafe, 1, VendorId(0xFFF1), NodeId(42), [9u8; 16], vec![1, 2, 3], vec![9]).unwrap();
        assert_eq!(registry.len(), 1);

        arm_fail_safe(&mut failsafe, &registry, 0, ArrivedOver::Case, now).unwrap();
        assert!(registry.is_empty(), "expiry=0 must roll back the fabric AddNOC just committed");
        assert_eq!(failsafe.state(), matter_failsafe::FailsafeState::Expired);
    }
}
