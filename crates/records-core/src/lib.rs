//! Ledger-resident record store.
//!
//! This crate holds everything that runs once a transaction has been
//! dispatched to the contract:
//!
//! * [`canonical`]: byte-stable JSON encoding for every ledger write.
//! * [`record`]: the stored entity and the parsing of its text arguments.
//! * [`state`]: the world state seen by one invocation, its read/write set
//!   and an ordered in-memory committed store.
//! * [`contract`]: the transaction registry and the CRUD handlers.
//!
//! Ordering, validation and commit of the produced read/write sets belong to
//! the caller.

pub mod canonical;
pub mod contract;
pub mod record;
pub mod state;

mod error;

pub use contract::{RecordContract, ResultKind, ScanEntry, TransactionKind, TransactionSpec};
pub use error::{ContractError, EncodeError, ErrorKind, StateError};
pub use record::Record;
pub use state::{
    CommittedState, MemoryState, RangeRead, ReadWriteSet, StateIterator, TxContext, Version,
    VersionedValue, WorldState, WriteOp,
};

pub(crate) mod serde_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
