use agora_types::{CityId, ModuleId, SubmissionId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("submission {0} not found")]
    NotFound(SubmissionId),

    #[error("{reviewer} is not a reviewer for {module} in {city}")]
    NotReviewer {
        reviewer: UserId,
        city: CityId,
        module: ModuleId,
    },

    #[error("storage error: {0}")]
    Storage(#[from] agora_store::StoreError),

    #[error("trust error: {0}")]
    Trust(#[from] agora_trust::TrustError),
}
