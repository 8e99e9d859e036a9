use std::{
    fmt,
    time::{Duration, Instant},
};

use rand::Rng;
use records_core::{
    canonical, ContractError, EncodeError, ErrorKind, ReadWriteSet, RecordContract,
    TransactionKind, TransactionSpec, TxContext,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::ledger::{CommitStatus, LedgerError, LedgerState, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Evaluate,
    Endorse,
    Submit,
    CommitStatus,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Evaluate => "evaluate",
            Phase::Endorse => "endorse",
            Phase::Submit => "submit",
            Phase::CommitStatus => "commit status",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{transaction} failed ({kind}): {source}")]
    Contract {
        transaction: String,
        kind: ErrorKind,
        #[source]
        source: ContractError,
    },
    #[error("{name} is registered as {registered:?} and cannot be invoked as {requested:?}")]
    WrongInvocation {
        name: String,
        registered: TransactionKind,
        requested: TransactionKind,
    },
    #[error("{phase} deadline of {budget_ms}ms exceeded ({elapsed_ms}ms)")]
    DeadlineExceeded {
        phase: Phase,
        budget_ms: u128,
        elapsed_ms: u128,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl GatewayError {
    fn contract(transaction: &str, source: ContractError) -> Self {
        GatewayError::Contract {
            transaction: transaction.to_string(),
            kind: source.kind(),
            source,
        }
    }
}

struct Deadline {
    phase: Phase,
    budget: Duration,
    started: Instant,
}

impl Deadline {
    fn start(phase: Phase, budget: Duration) -> Self {
        Self {
            phase,
            budget,
            started: Instant::now(),
        }
    }

    fn check(&self) -> Result<(), GatewayError> {
        self.check_elapsed(self.started.elapsed())
    }

    fn check_elapsed(&self, elapsed: Duration) -> Result<(), GatewayError> {
        if elapsed > self.budget {
            return Err(GatewayError::DeadlineExceeded {
                phase: self.phase,
                budget_ms: self.budget.as_millis(),
                elapsed_ms: elapsed.as_millis(),
            });
        }
        Ok(())
    }
}

/// Fields hashed into a transaction id.
#[derive(Serialize)]
struct TxHeader<'a> {
    channel: &'a str,
    chaincode: &'a str,
    transaction: &'a str,
    args: &'a [String],
    nonce: u64,
}

/// Endorsed but not yet committed transaction.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub tx_id: TxId,
    pub transaction: String,
    pub payload: Option<String>,
    pub rwset: ReadWriteSet,
    /// Hex digest of `rwset`; equal across endorsers that agree.
    pub rwset_digest: String,
}

/// In-process stand-in for a gateway peer: runs the contract against the
/// committed ledger and commits what it endorses.
pub struct Gateway {
    config: HarnessConfig,
    contract: RecordContract,
    ledger: LedgerState,
}

impl Gateway {
    pub fn new(config: HarnessConfig, ledger: LedgerState) -> Self {
        Self {
            config,
            contract: RecordContract::new(),
            ledger,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn contract(&self) -> &RecordContract {
        &self.contract
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    fn spec(&self, name: &str, requested: TransactionKind) -> Result<TransactionSpec, GatewayError> {
        let spec = *self.contract.transaction(name).ok_or_else(|| {
            GatewayError::contract(name, ContractError::UnknownTransaction(name.to_string()))
        })?;
        if spec.kind != requested {
            return Err(GatewayError::WrongInvocation {
                name: name.to_string(),
                registered: spec.kind,
                requested,
            });
        }
        Ok(spec)
    }

    /// Runs a query transaction. Nothing it reads or writes is kept.
    pub fn evaluate(&self, name: &str, args: &[String]) -> Result<Option<String>, GatewayError> {
        let spec = self.spec(name, TransactionKind::Evaluate)?;
        let deadline = Deadline::start(Phase::Evaluate, self.config.timeouts.evaluate);
        let mut ctx = TxContext::new(self.ledger.world());
        let payload = self
            .contract
            .invoke(&mut ctx, spec.name, args)
            .map_err(|e| GatewayError::contract(spec.name, e))?;
        deadline.check()?;
        debug!(transaction = spec.name, "evaluated");
        Ok(payload)
    }

    /// Executes a submit transaction against current state and returns the
    /// proposal without committing it.
    pub fn endorse(&self, name: &str, args: &[String]) -> Result<Proposal, GatewayError> {
        let spec = self.spec(name, TransactionKind::Submit)?;
        let deadline = Deadline::start(Phase::Endorse, self.config.timeouts.endorse);
        let mut ctx = TxContext::new(self.ledger.world());
        let payload = self
            .contract
            .invoke(&mut ctx, spec.name, args)
            .map_err(|e| GatewayError::contract(spec.name, e))?;
        let rwset = ctx.into_rwset();
        deadline.check()?;

        let tx_id = self.tx_id(spec.name, args)?;
        let rwset_digest = hex::encode(rwset.digest()?);
        debug!(tx_id = %tx_id, transaction = spec.name, rwset = %rwset_digest, "endorsed");
        Ok(Proposal {
            tx_id,
            transaction: spec.name.to_string(),
            payload,
            rwset,
            rwset_digest,
        })
    }

    /// Orders and commits an endorsed proposal.
    pub fn commit(&mut self, proposal: &Proposal) -> Result<CommitStatus, GatewayError> {
        // Pre-check so the submit phase has its own deadline; commit
        // validates again.
        let submit = Deadline::start(Phase::Submit, self.config.timeouts.submit);
        self.ledger.validate(&proposal.rwset)?;
        submit.check()?;

        let status_deadline =
            Deadline::start(Phase::CommitStatus, self.config.timeouts.commit_status);
        let status = self.ledger.commit(&proposal.tx_id, &proposal.rwset)?;
        status_deadline.check()?;
        info!(
            tx_id = %status.tx_id,
            transaction = %proposal.transaction,
            height = status.height,
            rwset = %proposal.rwset_digest,
            "committed"
        );
        Ok(status)
    }

    pub fn submit(
        &mut self,
        name: &str,
        args: &[String],
    ) -> Result<(Option<String>, CommitStatus), GatewayError> {
        let proposal = self.endorse(name, args)?;
        let status = self.commit(&proposal)?;
        Ok((proposal.payload, status))
    }

    fn tx_id(&self, transaction: &str, args: &[String]) -> Result<TxId, GatewayError> {
        let header = TxHeader {
            channel: &self.config.channel_name,
            chaincode: &self.config.chaincode_name,
            transaction,
            args,
            nonce: rand::thread_rng().gen(),
        };
        let bytes = canonical::to_canonical_bytes(&header)?;
        Ok(hex::encode(Sha256::digest(bytes)))
    }
}
