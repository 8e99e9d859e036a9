use std::fmt;

use thiserror::Error;

/// Failure raised by a contract handler. Aborts the current invocation only.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A key had to be present and was not.
    #[error("record {id} does not exist")]
    NotFound { id: String },

    /// A key had to be absent and was not.
    #[error("record {id} already exists")]
    AlreadyExists { id: String },

    /// A text argument could not be turned into the field it stands for.
    #[error("malformed {field} {value:?}: {reason}")]
    MalformedInput {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),

    #[error("transaction {name} takes {min}..={max} arguments, got {actual}")]
    ArgumentCount {
        name: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl ContractError {
    pub(crate) fn malformed(
        field: &'static str,
        value: &str,
        reason: impl fmt::Display,
    ) -> Self {
        ContractError::MalformedInput {
            field,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Named condition reported on the invocation response.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::NotFound { .. } => ErrorKind::NotFound,
            ContractError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ContractError::MalformedInput { .. } => ErrorKind::MalformedInput,
            ContractError::UnknownTransaction(_) | ContractError::ArgumentCount { .. } => {
                ErrorKind::InvalidInvocation
            }
            ContractError::Encode(_) => ErrorKind::Encoding,
            ContractError::State(_) => ErrorKind::State,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    MalformedInput,
    InvalidInvocation,
    Encoding,
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::InvalidInvocation => "InvalidInvocation",
            ErrorKind::Encoding => "Encoding",
            ErrorKind::State => "State",
        };
        f.write_str(name)
    }
}

/// Canonical encoding failure.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Floating point values have no single byte rendering across nodes.
    #[error("floating point number {0} cannot be canonically encoded")]
    FloatingPoint(String),
}

/// World state access failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state keys must not be empty")]
    EmptyKey,

    #[error("state backend error: {0}")]
    Backend(String),
}
