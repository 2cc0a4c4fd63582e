use relayer_ledger::LedgerError;
use relayer_payout::PayoutError;
use relayer_source::SourceError;
use thiserror::Error;

/// Errors that keep the relayer from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("payout: {0}")]
    Payout(#[from] PayoutError),

    #[error("source: {0}")]
    Source(#[from] SourceError),
}

pub type RelayResult<T> = Result<T, RelayError>;
