//! Trust engine errors.

use agora_types::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("stake already recorded for job {0}")]
    StakeExists(JobId),

    #[error("reputation too low to stake")]
    NothingToStake,

    #[error("no locked stake for job {0}")]
    NoLockedStake(JobId),

    #[error("storage error: {0}")]
    Storage(#[from] agora_store::StoreError),
}
