//! Error taxonomy
//!
//! Task-level errors (`SessionError`, `NormalizeError`, `PersistError`) are
//! converted into audit records at the smallest scope. `LedgerError` is only
//! logged. `SourceError` and `SessionPoolError::Initialization` are the only
//! errors fatal to a run.

use thiserror::Error;

use crate::domain::extraction_spec::DatasetKind;

/// Errors raised by a `PageSession`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Navigation to {url} timed out")]
    NavigateTimeout { url: String },

    #[error("Element {locator} did not resolve in time")]
    ElementTimeout { locator: String },

    #[error("Session driver error: {0}")]
    Driver(String),

    #[error("Session is closed")]
    Closed,
}

/// Normalization failure: no usable table in the extracted markup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Destination write failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Persist to {table} failed: {message}")]
pub struct PersistError {
    pub table: String,
    pub message: String,
}

impl PersistError {
    #[must_use]
    pub fn new(table: impl Into<String>, message: impl ToString) -> Self {
        Self {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

/// Audit write failed (never fatal)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Audit ledger write failed: {0}")]
pub struct LedgerError(pub String);

/// Work unit inventory could not be listed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Work unit source failed: {0}")]
pub struct SourceError(pub String);

/// Extraction spec table violates an invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecTableError {
    #[error("Extraction spec table is empty")]
    Empty,

    #[error("Dataset {0} is declared more than once")]
    DuplicateDataset(DatasetKind),

    #[error("Dataset {0} has no extraction targets")]
    NoTargets(DatasetKind),

    #[error("Dataset {0} URL template has no {{key}} placeholder")]
    MissingKeyPlaceholder(DatasetKind),

    #[error("Target of dataset {target} listed under dataset {dataset}")]
    MismatchedTarget {
        dataset: DatasetKind,
        target: DatasetKind,
    },

    #[error("Dataset {0} has a target with an empty locator")]
    EmptyLocator(DatasetKind),

    #[error("Destination table '{0}' is not a valid identifier")]
    InvalidDestination(String),

    #[error("Destination table '{0}' is used by more than one target")]
    DuplicateDestination(String),
}

/// Session pool lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionPoolError {
    #[error("Session pool size {0} is out of range")]
    InvalidCapacity(usize),

    #[error("Session {session_id} failed to start: {source}")]
    Initialization {
        session_id: usize,
        source: SessionError,
    },

    #[error("Session pool is closed")]
    Closed,
}

/// Run-level failures; everything else is captured in audit records
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    SessionPool(#[from] SessionPoolError),
}
