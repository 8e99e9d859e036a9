//! World state access for a single invocation.
//!
//! Handlers see the store only through [`WorldState`]. The concrete
//! [`TxContext`] layers a write set over a committed snapshot, records what
//! it read and at which version, and hands the resulting [`ReadWriteSet`]
//! back to whoever orders and commits transactions. Nothing is written to
//! committed state from inside an invocation.

use std::collections::{btree_map, BTreeMap};
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{canonical, EncodeError, StateError};

/// Commit height at which a value was written.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedValue {
    #[serde(with = "crate::serde_hex")]
    pub value: Vec<u8>,
    pub version: Version,
}

/// Read access to committed state.
pub trait CommittedState {
    fn get(&self, key: &str) -> Option<&VersionedValue>;

    /// Entries with `start <= key < end` in ascending key order. An empty
    /// bound is open on that side.
    fn range<'a>(
        &'a self,
        start: &str,
        end: &str,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a VersionedValue)> + 'a>;
}

/// Store operations available to contract handlers.
pub trait WorldState {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError>;

    fn delete(&mut self, key: &str) -> Result<(), StateError>;

    fn range_scan(&mut self, start: &str, end: &str) -> Result<StateIterator, StateError>;
}

/// Single-pass scan result in ascending key order.
#[derive(Debug)]
pub struct StateIterator {
    inner: btree_map::IntoIter<String, Vec<u8>>,
}

impl StateIterator {
    fn new(entries: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            inner: entries.into_iter(),
        }
    }
}

impl Iterator for StateIterator {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Put {
        #[serde(with = "crate::serde_hex")]
        value: Vec<u8>,
    },
    Delete,
}

/// A range scan as observed against committed state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeRead {
    pub start: String,
    pub end: String,
    pub observed: Vec<(String, Version)>,
}

/// Everything one invocation read and wrote.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadWriteSet {
    pub reads: BTreeMap<String, Option<Version>>,
    pub range_reads: Vec<RangeRead>,
    pub writes: BTreeMap<String, WriteOp>,
}

impl ReadWriteSet {
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Hash of the canonical encoding. Equal on every node that executed
    /// the same invocation against the same state.
    pub fn digest(&self) -> Result<[u8; 32], EncodeError> {
        let mut hasher = Sha256::new();
        hasher.update(b"rwset-v1");
        hasher.update(canonical::to_canonical_bytes(self)?);
        Ok(hasher.finalize().into())
    }
}

pub struct TxContext<'a, S: CommittedState + ?Sized> {
    committed: &'a S,
    rwset: ReadWriteSet,
}

impl<'a, S: CommittedState + ?Sized> TxContext<'a, S> {
    pub fn new(committed: &'a S) -> Self {
        Self {
            committed,
            rwset: ReadWriteSet::default(),
        }
    }

    pub fn rwset(&self) -> &ReadWriteSet {
        &self.rwset
    }

    pub fn into_rwset(self) -> ReadWriteSet {
        self.rwset
    }
}

fn check_key(key: &str) -> Result<(), StateError> {
    if key.is_empty() {
        return Err(StateError::EmptyKey);
    }
    Ok(())
}

fn in_range(key: &str, start: &str, end: &str) -> bool {
    (start.is_empty() || key >= start) && (end.is_empty() || key < end)
}

impl<'a, S: CommittedState + ?Sized> WorldState for TxContext<'a, S> {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        check_key(key)?;
        if let Some(op) = self.rwset.writes.get(key) {
            return Ok(match op {
                WriteOp::Put { value } => Some(value.clone()),
                WriteOp::Delete => None,
            });
        }
        let committed_state = self.committed;
        let committed = committed_state.get(key);
        self.rwset
            .reads
            .entry(key.to_string())
            .or_insert_with(|| committed.map(|v| v.version));
        Ok(committed.map(|v| v.value.clone()))
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        check_key(key)?;
        self.rwset
            .writes
            .insert(key.to_string(), WriteOp::Put { value });
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        self.rwset.writes.insert(key.to_string(), WriteOp::Delete);
        Ok(())
    }

    fn range_scan(&mut self, start: &str, end: &str) -> Result<StateIterator, StateError> {
        let mut merged = BTreeMap::new();
        let mut observed = Vec::new();
        let committed = self.committed;
        for (key, entry) in committed.range(start, end) {
            observed.push((key.clone(), entry.version));
            merged.insert(key.clone(), entry.value.clone());
        }
        for (key, op) in &self.rwset.writes {
            if !in_range(key, start, end) {
                continue;
            }
            match op {
                WriteOp::Put { value } => {
                    merged.insert(key.clone(), value.clone());
                }
                WriteOp::Delete => {
                    merged.remove(key);
                }
            }
        }
        self.rwset.range_reads.push(RangeRead {
            start: start.to_string(),
            end: end.to_string(),
            observed,
        });
        Ok(StateIterator::new(merged))
    }
}

/// Ordered in-memory committed state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MemoryState {
    entries: BTreeMap<String, VersionedValue>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionedValue)> {
        self.entries.iter()
    }

    /// Writes a value directly, bypassing any transaction.
    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>, version: Version) {
        self.entries
            .insert(key.into(), VersionedValue { value, version });
    }

    /// Applies the write half of `rwset` at `version`.
    pub fn apply(&mut self, rwset: &ReadWriteSet, version: Version) {
        for (key, op) in &rwset.writes {
            match op {
                WriteOp::Put { value } => self.insert(key.clone(), value.clone(), version),
                WriteOp::Delete => {
                    self.entries.remove(key);
                }
            }
        }
    }
}

impl CommittedState for MemoryState {
    fn get(&self, key: &str) -> Option<&VersionedValue> {
        self.entries.get(key)
    }

    fn range<'a>(
        &'a self,
        start: &str,
        end: &str,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a VersionedValue)> + 'a> {
        if !start.is_empty() && !end.is_empty() && start >= end {
            return Box::new(std::iter::empty());
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        Box::new(self.entries.range::<str, _>((lower, upper)))
    }
}
