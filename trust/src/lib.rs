//! Trust engines.
//!
//! Two independent per-user metrics live here:
//! - Reputation: a slowly-changing score per (user, city) built from a
//!   profession baseline, verification bonuses and an append-only event log
//! - Vote weight: a bounded scalar per user moved only by voting outcomes
//!
//! The stake engine locks a share of reputation behind a job and returns
//! or burns it when the job resolves.

pub mod error;
pub mod reputation;
pub mod stake;
pub mod vote_weight;

pub use error::TrustError;
pub use reputation::{RepEventInput, ReputationEngine};
pub use stake::StakeEngine;
pub use vote_weight::VoteWeightEngine;
