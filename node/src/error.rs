use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] agora_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] agora_ledger::LedgerError),

    #[error("wallet error: {0}")]
    Wallet(#[from] agora_wallet_core::WalletError),

    #[error("trust error: {0}")]
    Trust(#[from] agora_trust::TrustError),

    #[error("review error: {0}")]
    Review(#[from] agora_review::ReviewError),

    #[error("storage backend error: {0}")]
    Lmdb(#[from] agora_store_lmdb::LmdbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
