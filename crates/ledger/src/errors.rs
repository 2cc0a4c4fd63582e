//! Defines errors related to persisting the processed deposit set.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Error encountered while reading or updating the ledger files.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// IO error when interfacing with the ledger files.
    #[error("storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but does not hold a JSON array of deposit ids.
    #[error("invalid ledger data in {path}: {reason}")]
    InvalidData { path: PathBuf, reason: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;
