//! Persisted fabric records (spec.md §6 "Persisted state"). Kept as a
//! small object-safe, synchronous trait — callers on a blocking backing
//! store `spawn_blocking`; see `matter-node`'s registry wiring.

use crate::error::FabricError;
use crate::fabric::Fabric;
use matter_types::FabricIndex;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub trait FabricStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Fabric>, FabricError>;
    fn put(&self, fabric: &Fabric) -> Result<(), FabricError>;
    fn delete(&self, fabric_index: FabricIndex) -> Result<(), FabricError>;
}

/// In-memory reference implementation; also useful directly in tests.
#[derive(Default)]
pub struct MemoryFabricStore {
    records: Mutex<BTreeMap<u8, Fabric>>,
}

impl MemoryFabricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FabricStore for MemoryFabricStore {
    fn load_all(&self) -> Result<Vec<Fabric>, FabricError> {
        Ok(self.records.lock().expect("lock poisoned").values().cloned().collect())
    }

    fn put(&self, fabric: &Fabric) -> Result<(), FabricError> {
        self.records
            .lock()
            .expect("lock poisoned")
            .insert(fabric.fabric_index.value(), fabric.clone());
        Ok(())
    }

    fn delete(&self, fabric_index: FabricIndex) -> Result<(), FabricError> {
        self.records.lock().expect("lock poisoned").remove(&fabric_index.value());
        Ok(())
    }
}

/// SQLite-backed store: WAL + `synchronous=FULL` + integrity check on open,
/// grounded on `services/forwarder/src/storage/journal.rs`'s durability
/// discipline. A single atomic commit per `put` (spec.md §6).
pub struct SqliteFabricStore {
    conn: Mutex<Connection>,
}

impl SqliteFabricStore {
    pub fn open(path: &Path) -> Result<Self, FabricError> {
        let conn = Connection::open(path).map_err(|e| FabricError::Store(e.to_string()))?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(include_str!("schema.sql")).map_err(|e| FabricError::Store(e.to_string()))?;
        Ok(SqliteFabricStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, FabricError> {
        let conn = Connection::open_in_memory().map_err(|e| FabricError::Store(e.to_string()))?;
        conn.execute_batch(include_str!("schema.sql")).map_err(|e| FabricError::Store(e.to_string()))?;
        Ok(SqliteFabricStore { conn: Mutex::new(conn) })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), FabricError> {
    conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| FabricError::Store(e.to_string()))?;
    conn.pragma_update(None, "synchronous", "FULL").map_err(|e| FabricError::Store(e.to_string()))?;
    conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| FabricError::Store(e.to_string()))?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), FabricError> {
    let result: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(|e| FabricError::Store(e.to_string()))?;
    if result != "ok" {
        return Err(FabricError::Store(format!("integrity_check failed: {result}")));
    }
    Ok(())
}

impl FabricStore for SqliteFabricStore {
    fn load_all(&self) -> Result<Vec<Fabric>, FabricError> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT fabric_index, fabric_id, root_public_key, root_vendor_id, compressed_fabric_id,
                        node_id, ipk, noc, icac, rcac, label
                 FROM fabrics",
            )
            .map_err(|e| FabricError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_fabric)
            .map_err(|e| FabricError::Store(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| FabricError::Store(e.to_string()))?);
        }
        Ok(out)
    }

    fn put(&self, fabric: &Fabric) -> Result<(), FabricError> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO fabrics
                (fabric_index, fabric_id, root_public_key, root_vendor_id, compressed_fabric_id,
                 node_id, ipk, noc, icac, rcac, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(fabric_index) DO UPDATE SET
                fabric_id = excluded.fabric_id,
                root_public_key = excluded.root_public_key,
                root_vendor_id = excluded.root_vendor_id,
                compressed_fabric_id = excluded.compressed_fabric_id,
                node_id = excluded.node_id,
                ipk = excluded.ipk,
                noc = excluded.noc,
                icac = excluded.icac,
                rcac = excluded.rcac,
                label = excluded.label",
            params![
                fabric.fabric_index.value(),
                fabric.fabric_id as i64,
                fabric.root_public_key,
                fabric.root_vendor_id.value(),
                fabric.compressed_fabric_id.as_slice(),
                fabric.node_id.value() as i64,
                fabric.operational_identity_protection_key.as_slice(),
                fabric.noc,
                fabric.icac,
                fabric.rcac,
                fabric.label,
            ],
        )
        .map_err(|e| FabricError::Store(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, fabric_index: FabricIndex) -> Result<(), FabricError> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute("DELETE FROM fabrics WHERE fabric_index = ?1", params![fabric_index.value()])
            .map_err(|e| FabricError::Store(e.to_string()))?;
        Ok(())
    }
}

fn row_to_fabric(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fabric> {
    let fabric_index: u8 = row.get(0)?;
    let fabric_id: i64 = row.get(1)?;
    let root_public_key: Vec<u8> = row.get(2)?;
    let root_vendor_id: u16 = row.get(3)?;
    let compressed_fabric_id: Vec<u8> = row.get(4)?;
    let node_id: i64 = row.get(5)?;
    let ipk: Vec<u8> = row.get(6)?;
    let noc: Vec<u8> = row.get(7)?;
    let icac: Option<Vec<u8>> = row.get(8)?;
    let rcac: Vec<u8> = row.get(9)?;
    let label: String = row.get(10)?;

    let compressed: [u8; 8] = compressed_fabric_id.try_into().unwrap_or([0u8; 8]);
    let ipk_arr: [u8; 16] = ipk.try_into().unwrap_or([0u8; 16]);

    Ok(Fabric {
        fabric_index: FabricIndex::new(fabric_index).unwrap_or(FabricIndex::new(1).expect("1 is valid")),
        fabric_id: fabric_id as u64,
        root_public_key,
        root_vendor_id: root_vendor_id.into(),
        compressed_fabric_id: compressed,
        node_id: (node_id as u64).into(),
        operational_identity_protection_key: ipk_arr,
        noc,
        icac,
        rcac,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use matter_types::NodeId;

    fn sample(index: u8) -> Fabric {
        Fabric {
            fabric_index: FabricIndex::new(index).unwrap(),
            fabric_id: 0x2906_c908_d115_d362,
            root_public_key: vec![0x04; 65],
            root_vendor_id: 0xFFF1.into(),
            compressed_fabric_id: [index; 8],
            node_id: NodeId(42),
            operational_identity_protection_key: [index; 16],
            noc: vec![1, 2, 3],
            icac: None,
            rcac: vec![4, 5, 6],
            label: "home".to_owned(),
        }
    }

    #[test]
    fn sqlite_store_round_trips_a_fabric() {
        let store = SqliteFabricStore::open_in_memory().unwrap();
        store.put(&sample(1)).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fabric_id, sample(1).fabric_id);
    }

    #[test]
    fn sqlite_store_upserts_on_fabric_index_conflict() {
        let store = SqliteFabricStore::open_in_memory().unwrap();
        store.put(&sample(1)).unwrap();
        let mut updated = sample(1);
        updated.label = "office".to_owned();
        store.put(&updated).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "office");
    }

    #[test]
    fn sqlite_store_delete_removes_the_record() {
        let store = SqliteFabricStore::open_in_memory().unwrap();
        store.put(&sample(1)).unwrap();
        store.delete(FabricIndex::new(1).unwrap()).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryFabricStore::new();
        store.put(&sample(5)).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
        store.delete(FabricIndex::new(5).unwrap()).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
