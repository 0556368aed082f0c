//! Fundamental types for the Agora review platform.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! identifiers, point amounts, timestamps and clocks, lifecycle enums, and the
//! tunable platform parameters.

pub mod amount;
pub mod ids;
pub mod params;
pub mod state;
pub mod time;

pub use amount::{Points, PointsParseError};
pub use ids::{CityId, JobId, ModuleId, OrderId, SubmissionId, UserId};
pub use params::{
    PlatformParams, PostingParams, QuorumParams, RepEventWeights, ReputationParams, StakeParams,
    VoteWeightParams,
};
pub use state::{EntryState, HoldStatus, Outcome, StakeStatus, SubmissionStatus};
pub use time::{Clock, SystemClock, Timestamp};
