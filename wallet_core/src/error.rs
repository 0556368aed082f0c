use agora_types::{OrderId, Points};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Points),

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Points, available: Points },

    #[error("cannot transfer to the same account")]
    SelfTransfer,

    #[error("no recipients")]
    NoRecipients,

    #[error("hold already exists for order {0}")]
    HoldExists(OrderId),

    #[error("no active hold for order {0}")]
    NoActiveHold(OrderId),

    #[error("invalid posting schedule: {0}")]
    InvalidSchedule(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] agora_ledger::LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] agora_store::StoreError),
}
