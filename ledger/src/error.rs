use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("balance of {0} out of range")]
    Overflow(agora_types::UserId),

    #[error("storage error: {0}")]
    Storage(#[from] agora_store::StoreError),
}
