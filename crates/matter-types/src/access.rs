//! ACL access levels checked during path resolution (spec.md §4.G.1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    View,
    Operate,
    Manage,
    Administer,
}

impl AccessLevel {
    /// `self` satisfies a requirement of `required` iff it is at least as
    /// privileged, using the View < Operate < Manage < Administer order.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_order_is_linear() {
        assert!(AccessLevel::Administer.satisfies(AccessLevel::View));
        assert!(AccessLevel::Manage.satisfies(AccessLevel::Operate));
        assert!(!AccessLevel::Operate.satisfies(AccessLevel::Manage));
        assert!(AccessLevel::View.satisfies(AccessLevel::View));
    }
}
