//! The record contract: CRUD handlers over [`WorldState`].
//!
//! Handlers are registered in a static table ([`TRANSACTIONS`]) that states,
//! per name, whether the transaction is evaluated or submitted and what kind
//! of payload it returns. [`RecordContract::invoke`] consults that table
//! before dispatching; nothing is discovered at runtime.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::record::{self, Record};
use crate::{ContractError, WorldState};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Query only. The read/write set is discarded.
    Evaluate,
    /// Produces a write set for ordering and commit.
    Submit,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Empty,
    Text,
    Boolean,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct TransactionSpec {
    pub name: &'static str,
    pub kind: TransactionKind,
    pub result: ResultKind,
    pub min_args: usize,
    pub max_args: usize,
}

impl TransactionSpec {
    const fn new(
        name: &'static str,
        kind: TransactionKind,
        result: ResultKind,
        min_args: usize,
        max_args: usize,
    ) -> Self {
        Self {
            name,
            kind,
            result,
            min_args,
            max_args,
        }
    }

    pub fn is_submit(&self) -> bool {
        self.kind == TransactionKind::Submit
    }
}

pub const TRANSACTIONS: &[TransactionSpec] = &[
    TransactionSpec::new("InitLedger", TransactionKind::Submit, ResultKind::Empty, 0, 0),
    TransactionSpec::new("GetAll", TransactionKind::Evaluate, ResultKind::Text, 0, 0),
    TransactionSpec::new("Create", TransactionKind::Submit, ResultKind::Empty, 3, 4),
    TransactionSpec::new("GetById", TransactionKind::Evaluate, ResultKind::Text, 1, 1),
    TransactionSpec::new("Update", TransactionKind::Submit, ResultKind::Empty, 3, 4),
    TransactionSpec::new("Delete", TransactionKind::Submit, ResultKind::Empty, 1, 1),
    TransactionSpec::new("CheckExists", TransactionKind::Evaluate, ResultKind::Boolean, 1, 1),
];

/// One element of the `GetAll` result.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ScanEntry {
    Record(Value),
    /// Stored value that did not parse; carried as its text.
    Degraded(String),
}

/// Outcome of a point lookup, before it is judged by a handler.
enum Presence {
    Present(Vec<u8>),
    Absent,
}

fn lookup(ctx: &mut dyn WorldState, key: &str) -> Result<Presence, ContractError> {
    Ok(match ctx.get(key)? {
        Some(bytes) if !bytes.is_empty() => Presence::Present(bytes),
        _ => Presence::Absent,
    })
}

#[derive(Clone, Debug)]
pub struct RecordContract {
    transactions: BTreeMap<&'static str, TransactionSpec>,
}

impl Default for RecordContract {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordContract {
    pub fn new() -> Self {
        let transactions = TRANSACTIONS.iter().map(|spec| (spec.name, *spec)).collect();
        Self { transactions }
    }

    pub fn transaction(&self, name: &str) -> Option<&TransactionSpec> {
        self.transactions.get(name)
    }

    /// Registered transactions in declaration order.
    pub fn transactions(&self) -> &'static [TransactionSpec] {
        TRANSACTIONS
    }

    /// Dispatches a named transaction with positional text arguments.
    ///
    /// Returns the text payload for `Text` and `Boolean` transactions and
    /// `None` for `Empty` ones.
    pub fn invoke(
        &self,
        ctx: &mut dyn WorldState,
        name: &str,
        args: &[String],
    ) -> Result<Option<String>, ContractError> {
        let spec = self
            .transaction(name)
            .ok_or_else(|| ContractError::UnknownTransaction(name.to_string()))?;
        if args.len() < spec.min_args || args.len() > spec.max_args {
            return Err(ContractError::ArgumentCount {
                name: spec.name,
                min: spec.min_args,
                max: spec.max_args,
                actual: args.len(),
            });
        }
        debug!(transaction = spec.name, args = args.len(), "dispatching");

        let arg = |i: usize| args[i].as_str();
        let note = args.get(3).map(String::as_str);
        match spec.name {
            "InitLedger" => self.init_ledger(ctx).map(|()| None),
            "GetAll" => self.get_all(ctx).map(Some),
            "Create" => self.create(ctx, arg(0), arg(1), arg(2), note).map(|()| None),
            "GetById" => self.get_by_id(ctx, arg(0)).map(Some),
            "Update" => self.update(ctx, arg(0), arg(1), arg(2), note).map(|()| None),
            "Delete" => self.delete(ctx, arg(0)).map(|()| None),
            "CheckExists" => self.check_exists(ctx, arg(0)).map(|b| Some(b.to_string())),
            other => Err(ContractError::UnknownTransaction(other.to_string())),
        }
    }

    /// Overwrites the seed records unconditionally.
    pub fn init_ledger(&self, ctx: &mut dyn WorldState) -> Result<(), ContractError> {
        for seed in record::seed_records() {
            ctx.put(&seed.key(), seed.encode()?)?;
            info!(id = seed.id, "record initialized");
        }
        Ok(())
    }

    /// Every stored value in key order, serialized as a JSON array.
    pub fn get_all(&self, ctx: &mut dyn WorldState) -> Result<String, ContractError> {
        let mut entries = Vec::new();
        for (key, bytes) in ctx.range_scan("", "")? {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let entry = match serde_json::from_str::<Value>(&text) {
                Ok(value) => ScanEntry::Record(value),
                Err(err) => {
                    warn!(key = %key, error = %err, "stored value is not valid JSON, returning raw text");
                    ScanEntry::Degraded(text)
                }
            };
            entries.push(entry);
        }
        Ok(serde_json::to_string(&entries).map_err(crate::EncodeError::from)?)
    }

    pub fn check_exists(&self, ctx: &mut dyn WorldState, id: &str) -> Result<bool, ContractError> {
        let Ok(key) = record::record_key(id) else {
            return Ok(false);
        };
        Ok(matches!(lookup(ctx, &key)?, Presence::Present(_)))
    }

    pub fn create(
        &self,
        ctx: &mut dyn WorldState,
        id: &str,
        name: &str,
        amount: &str,
        note: Option<&str>,
    ) -> Result<(), ContractError> {
        let record = Record::from_args(id, name, amount, note)?;
        let key = record.key();
        if let Presence::Present(_) = lookup(ctx, &key)? {
            return Err(ContractError::AlreadyExists { id: key });
        }
        ctx.put(&key, record.encode()?)?;
        Ok(())
    }

    /// Stored bytes for `id` as text.
    pub fn get_by_id(&self, ctx: &mut dyn WorldState, id: &str) -> Result<String, ContractError> {
        let key = record::record_key(id)?;
        match lookup(ctx, &key)? {
            Presence::Present(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Presence::Absent => Err(ContractError::NotFound { id: key }),
        }
    }

    /// Replaces an existing record in full.
    pub fn update(
        &self,
        ctx: &mut dyn WorldState,
        id: &str,
        name: &str,
        amount: &str,
        note: Option<&str>,
    ) -> Result<(), ContractError> {
        let record = Record::from_args(id, name, amount, note)?;
        let key = record.key();
        if let Presence::Absent = lookup(ctx, &key)? {
            return Err(ContractError::NotFound { id: key });
        }
        ctx.put(&key, record.encode()?)?;
        Ok(())
    }

    pub fn delete(&self, ctx: &mut dyn WorldState, id: &str) -> Result<(), ContractError> {
        let key = record::record_key(id)?;
        if let Presence::Absent = lookup(ctx, &key)? {
            return Err(ContractError::NotFound { id: key });
        }
        ctx.delete(&key)?;
        Ok(())
    }
}
