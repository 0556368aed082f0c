//! Per-account ledger.
//!
//! Every user has two buckets: `pending` entries wait for the daily posting
//! run, `posted` entries make up the spendable balance. Entries are only
//! ever prepended or moved from pending to posted. This layer never checks
//! balances; that is the wallet's job.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{EntryDraft, Ledger};
