//! Ledger storage: per-account entry buckets and escrow holds.

use crate::StoreError;
use agora_types::{CityId, EntryState, HoldStatus, ModuleId, OrderId, Points, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Immutable ledger record. Credits are positive, debits negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: Timestamp,
    pub amount: Points,
    pub reason: String,
    #[serde(default)]
    pub module: Option<ModuleId>,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub city: Option<CityId>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub state: EntryState,
}

/// Both buckets of one user's ledger, each newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountLedger {
    pub user: UserId,
    pub pending: Vec<LedgerEntry>,
    pub posted: Vec<LedgerEntry>,
    /// When pending entries were last moved to posted.
    #[serde(default)]
    pub last_posted_at: Option<Timestamp>,
}

impl AccountLedger {
    pub fn empty(user: UserId) -> Self {
        Self {
            user,
            pending: Vec::new(),
            posted: Vec::new(),
            last_posted_at: None,
        }
    }

    /// No entries and never posted: the state of an account that was never stored.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.posted.is_empty() && self.last_posted_at.is_none()
    }

    /// Spendable balance: the sum of posted entries only. `None` when the
    /// sum does not fit.
    pub fn posted_balance(&self) -> Option<Points> {
        Points::checked_sum(self.posted.iter().map(|e| e.amount))
    }
}

/// An escrow hold keyed by order id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowHold {
    /// Unique per hold; an order may accumulate several resolved holds over time.
    pub hold_id: String,
    pub order: OrderId,
    pub payer: UserId,
    #[serde(default)]
    pub payee: Option<UserId>,
    pub amount: Points,
    pub status: HoldStatus,
    pub memo: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
}

/// One record in an atomic ledger batch.
#[derive(Clone, Debug)]
pub enum LedgerWrite {
    /// Replace the account's ledger.
    Account(AccountLedger),
    /// Insert or replace (by `hold_id`) a hold of the order.
    Hold(EscrowHold),
}

/// Trait for ledger and escrow storage.
pub trait LedgerStore {
    /// The user's ledger; an empty one if the user has no entries yet.
    fn account_ledger(&self, user: &UserId) -> Result<AccountLedger, StoreError>;

    /// Every user that has a stored ledger.
    fn ledger_accounts(&self) -> Result<Vec<UserId>, StoreError>;

    /// All holds ever recorded for an order, oldest first.
    fn holds(&self, order: &OrderId) -> Result<Vec<EscrowHold>, StoreError>;

    /// Apply every write or none of them.
    fn write_batch(&self, writes: &[LedgerWrite]) -> Result<(), StoreError>;
}
