//! Abstract storage traits for the Agora platform.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The engines depend only on the traits, one per entity family.

pub mod error;
pub mod ledger;
pub mod review;
pub mod trust;

pub use error::StoreError;
pub use ledger::{AccountLedger, EscrowHold, LedgerEntry, LedgerStore, LedgerWrite};
pub use review::{
    AgreementRecord, DecisionBatch, ModerationLogEntry, ModerationStore, QuorumSnapshot,
    ReviewerStore, Submission, SubmissionStore, TrustFollowup, VoteBox, VoteChange, VoteSnapshot,
};
pub use trust::{
    ProfileStore, RepEvent, RepEventKind, ReputationStore, StakeRecord, StakeStore, TrustProfile,
    VoteWeightRow, VoteWeightStore,
};

/// Every store the platform needs, implemented by a single backend.
pub trait PlatformStore:
    SubmissionStore
    + ReviewerStore
    + ModerationStore
    + LedgerStore
    + ProfileStore
    + ReputationStore
    + VoteWeightStore
    + StakeStore
    + Send
    + Sync
{
}

impl<T> PlatformStore for T where
    T: SubmissionStore
        + ReviewerStore
        + ModerationStore
        + LedgerStore
        + ProfileStore
        + ReputationStore
        + VoteWeightStore
        + StakeStore
        + Send
        + Sync
{
}
