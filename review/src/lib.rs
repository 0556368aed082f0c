//! Weighted peer review.
//!
//! A submission enters as `pending`; registered reviewers for its
//! (city, module) cast approve/reject votes; each vote counts with the
//! reviewer's quorum weight. Once one side crosses both the weight quorum
//! and the module's approval-ratio threshold, the submission is finalized
//! exactly once: status, agreement records and the moderation log commit
//! together, then trust metrics and the module's finalize hook are updated.

pub mod engine;
pub mod error;
pub mod hooks;
pub mod quorum;
pub mod weight;

pub use engine::{FollowupReport, ReviewEngine, SubmissionDraft, VoteResult};
pub use error::ReviewError;
pub use hooks::{FinalizeHook, Finalization, HookError};
pub use quorum::{QuorumInfo, Tally};
pub use weight::QuorumWeigher;
