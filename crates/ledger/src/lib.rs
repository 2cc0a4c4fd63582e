//! Crash-safe record of which deposits have already been paid out.
//!
//! Two JSON files are kept: the processed set, which only ever grows, and a submission journal
//! listing deposits whose payout was started but whose outcome is not recorded yet. A deposit in
//! either file is never paid again.

mod errors;
mod ledger;

pub use errors::{LedgerError, LedgerResult};
pub use ledger::{journal_path_for, DedupLedger};
