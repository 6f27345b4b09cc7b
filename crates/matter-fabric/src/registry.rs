//! Fabric Registry (spec.md §4.E): indexed storage, lookups, and
//! add/updated/deleted observables. Cascading session teardown on delete is
//! the service layer's job: `services/node::run` subscribes to
//! [`FabricEvent::Deleted`] and calls
//! `matter_session::SessionManager::destroy_all_for_fabric`, which in turn
//! fires `SessionDestroyed` for each session so exchange/routing state
//! gets cleaned up the same way any other session teardown does.

use crate::error::FabricError;
use crate::fabric::Fabric;
use crate::store::FabricStore;
use matter_crypto::{ct_eq, derive_compressed_fabric_id, derive_ipk, destination_id};
use matter_types::{FabricIndex, NodeId, VendorId};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricEvent {
    Added(FabricIndex),
    Updated(FabricIndex),
    Deleted(FabricIndex),
}

/// Parameters for joining a new fabric, before a `fabricIndex` is assigned.
pub struct NewFabric {
    pub fabric_id: u64,
    pub root_public_key: Vec<u8>,
    pub root_vendor_id: VendorId,
    pub node_id: NodeId,
    pub epoch_key: [u8; 16],
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    pub rcac: Vec<u8>,
    pub label: String,
}

pub struct FabricRegistry {
    store: Arc<dyn FabricStore>,
    fabrics: RwLock<BTreeMap<u8, Fabric>>,
    events: broadcast::Sender<FabricEvent>,
}

impl FabricRegistry {
    /// Load every persisted fabric from `store` at construction.
    pub fn load(store: Arc<dyn FabricStore>) -> Result<Self, FabricError> {
        let loaded = store.load_all()?;
        let mut fabrics = BTreeMap::new();
        for fabric in loaded {
            fabrics.insert(fabric.fabric_index.value(), fabric);
        }
        let (events, _rx) = broadcast::channel(64);
        Ok(FabricRegistry { store, fabrics: RwLock::new(fabrics), events })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FabricEvent> {
        self.events.subscribe()
    }

    /// Allocate the lowest free `fabricIndex` in `1..=254`.
    fn allocate_index(&self) -> Result<FabricIndex, FabricError> {
        let fabrics = self.fabrics.read().expect("lock poisoned");
        for candidate in FabricIndex::MIN..=FabricIndex::MAX {
            if !fabrics.contains_key(&candidate) {
                return Ok(FabricIndex::new(candidate).expect("candidate is in range"));
            }
        }
        Err(FabricError::IndexSpaceExhausted)
    }

    /// Commissioning commit (spec.md §4.E / §4.5): derive IPK and
    /// compressed fabric ID, allocate a fabric index, persist, and emit
    /// `Added`.
    pub fn add_fabric(&self, new: NewFabric) -> Result<FabricIndex, FabricError> {
        {
            let fabrics = self.fabrics.read().expect("lock poisoned");
            if let Some(existing) = fabrics.values().find(|f| f.identity_key() == (new.root_public_key.as_slice(), new.fabric_id)) {
                return Err(FabricError::DuplicateRootAndFabricId { existing: existing.fabric_index.value() });
            }
        }

        let fabric_index = self.allocate_index()?;
        let ipk = derive_ipk(&new.epoch_key, new.fabric_id)?;
        let compressed_fabric_id = derive_compressed_fabric_id(&new.root_public_key, new.fabric_id)?;

        let fabric = Fabric {
            fabric_index,
            fabric_id: new.fabric_id,
            root_public_key: new.root_public_key,
            root_vendor_id: new.root_vendor_id,
            compressed_fabric_id,
            node_id: new.node_id,
            operational_identity_protection_key: ipk,
            noc: new.noc,
            icac: new.icac,
            rcac: new.rcac,
            label: new.label,
        };

        self.store.put(&fabric)?;
        self.fabrics.write().expect("lock poisoned").insert(fabric_index.value(), fabric);
        info!(fabric_index = fabric_index.value(), "fabric added");
        let _ = self.events.send(FabricEvent::Added(fabric_index));
        Ok(fabric_index)
    }

    /// AddNOC/UpdateNOC mutation of an existing fabric's operational
    /// certificate chain (spec.md §3 lifecycle).
    pub fn update_noc(&self, fabric_index: FabricIndex, noc: Vec<u8>, icac: Option<Vec<u8>>) -> Result<(), FabricError> {
        let mut fabrics = self.fabrics.write().expect("lock poisoned");
        let fabric = fabrics.get_mut(&fabric_index.value()).ok_or(FabricError::NotFound(fabric_index.value()))?;
        fabric.noc = noc;
        fabric.icac = icac;
        self.store.put(fabric)?;
        let _ = self.events.send(FabricEvent::Updated(fabric_index));
        Ok(())
    }

    pub fn remove_fabric(&self, fabric_index: FabricIndex) -> Result<Fabric, FabricError> {
        let removed = self
            .fabrics
            .write()
            .expect("lock poisoned")
            .remove(&fabric_index.value())
            .ok_or(FabricError::NotFound(fabric_index.value()))?;
        self.store.delete(fabric_index)?;
        warn!(fabric_index = fabric_index.value(), "fabric removed, cascading session teardown expected");
        let _ = self.events.send(FabricEvent::Deleted(fabric_index));
        Ok(removed)
    }

    pub fn get(&self, fabric_index: FabricIndex) -> Option<Fabric> {
        self.fabrics.read().expect("lock poisoned").get(&fabric_index.value()).cloned()
    }

    pub fn by_compressed_fabric_id(&self, compressed: &[u8; 8]) -> Option<Fabric> {
        self.fabrics.read().expect("lock poisoned").values().find(|f| &f.compressed_fabric_id == compressed).cloned()
    }

    pub fn by_root_and_fabric_id(&self, root_public_key: &[u8], fabric_id: u64) -> Option<Fabric> {
        self.fabrics
            .read()
            .expect("lock poisoned")
            .values()
            .find(|f| f.identity_key() == (root_public_key, fabric_id))
            .cloned()
    }

    /// CASE Sigma1 destination-ID resolution (spec.md §4.D.2): iterate every
    /// joined fabric's IPK and return the one whose computed destination ID
    /// matches the peer-supplied value. The match itself is a MAC
    /// comparison (destination ID is an HMAC-SHA-256 tag), so it's done in
    /// constant time rather than with `==`.
    pub fn by_destination_id(&self, random: &[u8; 32], candidate_dest_node_id: u64, received: &[u8; 32]) -> Option<Fabric> {
        self.fabrics.read().expect("lock poisoned").values().find(|fabric| {
            let computed = destination_id(
                &fabric.operational_identity_protection_key,
                random,
                &fabric.root_public_key,
                fabric.fabric_id,
                candidate_dest_node_id,
            );
            ct_eq(&computed, received)
        }).cloned()
    }

    pub fn len(&self) -> usize {
        self.fabrics.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Fabric> {
        self.fabrics.read().expect("lock poisoned").values().cloned().collect()
    }
}
