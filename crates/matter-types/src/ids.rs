//! Scalar identifier newtypes shared across the workspace.
//!
//! These mirror the wire-level integer widths from the Matter core spec
//! (§3 Data Model) rather than collapsing everything to `u64`, so a
//! misplaced `ClusterId` where an `AttributeId` is expected is a type
//! error, not a runtime bug.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident, $repr:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $repr);

        impl $name {
            pub const fn value(self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(NodeId, u64, "A Matter node's 64-bit operational or ephemeral identifier.");
id_newtype!(VendorId, u16, "16-bit vendor identifier assigned by the CSA.");
id_newtype!(GroupId, u16, "16-bit group identifier scoped to a fabric.");
id_newtype!(EndpointId, u16, "A functional sub-address of a node.");
id_newtype!(ClusterId, u32, "A typed bundle of attributes/commands/events.");
id_newtype!(AttributeId, u32, "An attribute within a cluster.");
id_newtype!(CommandId, u32, "A command within a cluster.");
id_newtype!(EventId, u32, "An event within a cluster.");

/// A fabric's local index. Valid range is 1–254; 0 is reserved ("no fabric").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FabricIndex(u8);

impl FabricIndex {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 254;

    /// Construct a `FabricIndex`, rejecting the reserved value `0` and `255`.
    pub fn new(value: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(FabricIndex(value))
        } else {
            None
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FabricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fabric_index_rejects_zero_and_255() {
        assert!(FabricIndex::new(0).is_none());
        assert!(FabricIndex::new(255).is_none());
        assert!(FabricIndex::new(1).is_some());
        assert!(FabricIndex::new(254).is_some());
    }

    #[test]
    fn id_newtypes_display_and_roundtrip_json() {
        let n = NodeId(0x1122_3344_5566_7788);
        let json = serde_json::to_string(&n).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(n, back);
        assert_eq!(format!("{n}"), "1234605616436508552");
    }
}
