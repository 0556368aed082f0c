//! Wallet core for the Agora platform.
//!
//! Provides everything that moves points between accounts:
//! - Immediate deposit, withdraw and transfer (posted at once)
//! - Deferred rewards and reward splits (pending until the daily posting run)
//! - Escrow holds with release and refund
//! - The posting scheduler that moves pending entries to posted once a day

pub mod error;
pub mod escrow;
pub mod scheduler;
pub mod wallet;

pub use error::WalletError;
pub use scheduler::{PostingReport, PostingScheduler};
pub use wallet::WalletOps;
