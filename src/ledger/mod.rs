use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use records_core::{CommittedState, MemoryState, ReadWriteSet, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Hex encoded transaction id.
pub type TxId = String;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction {0} was already committed")]
    DuplicateTransaction(TxId),
    #[error("stale read of key {key}: read {read:?}, committed {current:?}")]
    MvccReadConflict {
        key: String,
        read: Option<Version>,
        current: Option<Version>,
    },
    #[error("range [{start:?}, {end:?}) changed since it was scanned")]
    PhantomRead { start: String, end: String },
    #[error("snapshot state root {recorded} does not match contents ({computed})")]
    StateRootMismatch { recorded: String, computed: String },
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub last_tx: Option<TxId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitStatus {
    pub tx_id: TxId,
    pub height: u64,
    pub writes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub world: MemoryState,
    pub committed: BTreeSet<TxId>,
    pub state_root: String,
}

/// Committed world state plus the bookkeeping needed to validate new
/// read/write sets against it.
///
/// Every committed tx id is kept for duplicate detection and written into
/// each snapshot; the set is never pruned.
#[derive(Clone, Debug, Default)]
pub struct LedgerState {
    pub meta: SnapshotMetadata,
    world: MemoryState,
    committed: BTreeSet<TxId>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(&self) -> &MemoryState {
        &self.world
    }

    pub fn height(&self) -> u64 {
        self.meta.height
    }

    /// Optimistic validation: everything the transaction read must still be
    /// what is committed now.
    pub fn validate(&self, rwset: &ReadWriteSet) -> Result<(), LedgerError> {
        for (key, read) in &rwset.reads {
            let current = self.world.get(key).map(|v| v.version);
            if *read != current {
                return Err(LedgerError::MvccReadConflict {
                    key: key.clone(),
                    read: *read,
                    current,
                });
            }
        }
        for range in &rwset.range_reads {
            let now: Vec<(String, Version)> = self
                .world
                .range(&range.start, &range.end)
                .map(|(k, v)| (k.clone(), v.version))
                .collect();
            if now != range.observed {
                return Err(LedgerError::PhantomRead {
                    start: range.start.clone(),
                    end: range.end.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn commit(
        &mut self,
        tx_id: &str,
        rwset: &ReadWriteSet,
    ) -> Result<CommitStatus, LedgerError> {
        if self.committed.contains(tx_id) {
            return Err(LedgerError::DuplicateTransaction(tx_id.to_string()));
        }
        if let Err(err) = self.validate(rwset) {
            warn!(tx_id, error = %err, "transaction invalidated");
            return Err(err);
        }

        let height = self.meta.height + 1;
        self.world.apply(rwset, Version(height));
        self.meta.height = height;
        self.meta.last_tx = Some(tx_id.to_string());
        self.committed.insert(tx_id.to_string());
        debug!(tx_id, height, writes = rwset.writes.len(), "transaction committed");
        Ok(CommitStatus {
            tx_id: tx_id.to_string(),
            height,
            writes: rwset.writes.len(),
        })
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(&self.world)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            world: self.world.clone(),
            committed: self.committed.clone(),
            state_root: hex::encode(self.state_root()),
        }
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let computed = hex::encode(compute_state_root(&snapshot.world));
        if computed != snapshot.state_root {
            return Err(LedgerError::StateRootMismatch {
                recorded: snapshot.state_root,
                computed,
            });
        }
        Ok(Self {
            meta: snapshot.meta,
            world: snapshot.world,
            committed: snapshot.committed,
        })
    }

    /// A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        Self::from_snapshot(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn compute_state_root(world: &MemoryState) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = world
        .iter()
        .map(|(key, entry)| {
            let mut hasher = Sha256::new();
            hasher.update(b"entry");
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((entry.value.len() as u64).to_le_bytes());
            hasher.update(&entry.value);
            hasher.update(entry.version.0.to_le_bytes());
            let leaf: [u8; 32] = hasher.finalize().into();
            leaf
        })
        .collect();
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"records-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next: Vec<[u8; 32]> = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    use records_core::{TxContext, WorldState};

    fn write(ledger: &LedgerState, key: &str, value: &[u8]) -> ReadWriteSet {
        let mut ctx = TxContext::new(ledger.world());
        ctx.get(key).unwrap();
        ctx.put(key, value.to_vec()).unwrap();
        ctx.into_rwset()
    }

    #[test]
    fn commit_applies_writes_and_bumps_height() {
        let mut ledger = LedgerState::new();
        let rwset = write(&ledger, "1", b"one");
        let status = ledger.commit("tx-1", &rwset).unwrap();
        assert_eq!(status.height, 1);
        assert_eq!(status.writes, 1);
        assert_eq!(ledger.world().get("1").unwrap().version, Version(1));
        assert_eq!(ledger.meta.last_tx.as_deref(), Some("tx-1"));
    }

    #[test]
    fn duplicate_transaction_is_rejected() {
        let mut ledger = LedgerState::new();
        let rwset = write(&ledger, "1", b"one");
        ledger.commit("tx-1", &rwset).unwrap();
        let err = ledger.commit("tx-1", &ReadWriteSet::default()).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTransaction(_)));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn concurrent_writers_to_same_key_conflict() {
        let mut ledger = LedgerState::new();
        let first = write(&ledger, "1", b"a");
        let second = write(&ledger, "1", b"b");
        ledger.commit("tx-a", &first).unwrap();
        let err = ledger.commit("tx-b", &second).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MvccReadConflict { ref key, read: None, current: Some(Version(1)) } if key == "1"
        ));
        assert_eq!(ledger.world().get("1").unwrap().value, b"a");
    }

    #[test]
    fn blind_writes_do_not_conflict() {
        let mut ledger = LedgerState::new();
        let mut ctx = TxContext::new(ledger.world());
        ctx.put("1", b"a".to_vec()).unwrap();
        let first = ctx.into_rwset();
        let mut ctx = TxContext::new(ledger.world());
        ctx.put("1", b"b".to_vec()).unwrap();
        let second = ctx.into_rwset();
        ledger.commit("tx-a", &first).unwrap();
        ledger.commit("tx-b", &second).unwrap();
        assert_eq!(ledger.world().get("1").unwrap().value, b"b");
    }

    #[test]
    fn insert_into_scanned_range_is_a_phantom() {
        let mut ledger = LedgerState::new();
        let scan = {
            let mut ctx = TxContext::new(ledger.world());
            let _ = ctx.range_scan("", "").unwrap().count();
            ctx.put("9", b"summary".to_vec()).unwrap();
            ctx.into_rwset()
        };
        let insert = write(&ledger, "3", b"three");
        ledger.commit("tx-insert", &insert).unwrap();
        let err = ledger.commit("tx-scan", &scan).unwrap_err();
        assert!(matches!(err, LedgerError::PhantomRead { .. }));
    }

    #[test]
    fn state_root_tracks_contents() {
        let mut a = LedgerState::new();
        let mut b = LedgerState::new();
        assert_eq!(a.state_root(), b.state_root());
        a.commit("tx-1", &write(&a, "1", b"x")).unwrap();
        assert_ne!(a.state_root(), b.state_root());
        b.commit("tx-other", &write(&b, "1", b"x")).unwrap();
        assert_eq!(a.state_root(), b.state_root());
    }

    #[test]
    fn snapshot_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.state.json");
        let mut ledger = LedgerState::new();
        ledger.commit("tx-1", &write(&ledger, "1", b"{\"id\":1}")).unwrap();
        ledger.commit("tx-2", &write(&ledger, "2", b"{\"id\":2}")).unwrap();
        ledger.save(&path).unwrap();

        let loaded = LedgerState::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), ledger.snapshot());
        let err = {
            let mut again = loaded;
            again.commit("tx-2", &ReadWriteSet::default()).unwrap_err()
        };
        assert!(matches!(err, LedgerError::DuplicateTransaction(_)));
    }

    #[test]
    fn save_replaces_previous_snapshot_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.state.json");
        fs::write(&path, b"{ truncated").unwrap();
        let mut ledger = LedgerState::new();
        ledger.commit("tx-1", &write(&ledger, "1", b"x")).unwrap();
        ledger.save(&path).unwrap();
        assert_eq!(LedgerState::load(&path).unwrap().snapshot(), ledger.snapshot());
        assert!(!dir.path().join("ledger.state.json.tmp").exists());
    }

    #[test]
    fn tampered_snapshot_is_refused() {
        let mut ledger = LedgerState::new();
        ledger.commit("tx-1", &write(&ledger, "1", b"x")).unwrap();
        let mut snapshot = ledger.snapshot();
        snapshot.world.insert("1", b"y".to_vec(), Version(1));
        let err = LedgerState::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, LedgerError::StateRootMismatch { .. }));
    }

    #[test]
    fn missing_snapshot_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerState::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(ledger.height(), 0);
        assert!(ledger.world().is_empty());
    }
}
