//! What an expiring failsafe context must undo (spec.md §4.I: "On expire
//! roll back: delete any fabric added under this context, restore prior
//! regulatory config, close commissioning window, clear temporary ACL
//! entries"). This module only accumulates the plan; executing it against
//! the fabric registry / endpoint graph is the caller's job.

use matter_types::FabricIndex;

#[derive(Debug, Clone, Default)]
pub struct RollbackPlan {
    pub fabric_added: Option<FabricIndex>,
    pub prior_regulatory_config: Option<String>,
    pub commissioning_window_open: bool,
    pub temporary_acl_entries: Vec<(u16, usize)>,
}

impl RollbackPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fabric_added(&mut self, fabric: FabricIndex) {
        self.fabric_added = Some(fabric);
    }

    pub fn record_prior_regulatory_config(&mut self, config: impl Into<String>) {
        if self.prior_regulatory_config.is_none() {
            self.prior_regulatory_config = Some(config.into());
        }
    }

    pub fn record_commissioning_window_open(&mut self) {
        self.commissioning_window_open = true;
    }

    pub fn record_temporary_acl(&mut self, endpoint: u16, index: usize) {
        self.temporary_acl_entries.push((endpoint, index));
    }

    pub fn is_empty(&self) -> bool {
        self.fabric_added.is_none() && self.prior_regulatory_config.is_none() && !self.commissioning_window_open && self.temporary_acl_entries.is_empty()
    }
}
