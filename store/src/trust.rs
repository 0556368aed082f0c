//! Trust storage: profiles, reputation events, vote-weight values and stakes.

use crate::StoreError;
use agora_types::{CityId, JobId, StakeStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Verification flags and membership of a user. Boolean inputs only;
/// the platform does not verify anything itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustProfile {
    pub user: UserId,
    #[serde(default)]
    pub profession: Option<String>,
    /// Phone number or email address verified.
    #[serde(default)]
    pub contact_verified: bool,
    #[serde(default)]
    pub kyc_verified: bool,
    /// Tax-id (PAN-equivalent) verified.
    #[serde(default)]
    pub pan_verified: bool,
    #[serde(default)]
    pub address_verified: bool,
    #[serde(default)]
    pub profile_complete: bool,
    #[serde(default)]
    pub is_member: bool,
}

impl TrustProfile {
    /// A profile with no verifications.
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            profession: None,
            contact_verified: false,
            kyc_verified: false,
            pan_verified: false,
            address_verified: false,
            profile_complete: false,
            is_member: false,
        }
    }
}

/// Kind of reputation event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepEventKind {
    VoteCorrect,
    VoteWrong,
    JobCompleted,
    JobDefaulted,
    ContributionApproved,
    ContributionRejected,
    StakeLock,
    StakeReturn,
    StakeBonus,
    StakeBurn,
    /// Operator adjustment.
    Manual,
}

/// One entry of the append-only reputation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepEvent {
    pub kind: RepEventKind,
    pub delta: f64,
    pub reason: String,
    #[serde(default)]
    pub ref_id: Option<String>,
    pub at: Timestamp,
}

/// One change of a user's vote weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteWeightRow {
    pub at: Timestamp,
    pub city: CityId,
    pub correct: bool,
    pub previous: f64,
    pub next: f64,
    /// Decision that caused the change, when there is one.
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// A reputation stake backing one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub user: UserId,
    pub city: CityId,
    pub job: JobId,
    pub amount: f64,
    pub status: StakeStatus,
    pub locked_at: Timestamp,
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
}

pub trait ProfileStore {
    fn profile(&self, user: &UserId) -> Result<Option<TrustProfile>, StoreError>;
    fn put_profile(&self, profile: &TrustProfile) -> Result<(), StoreError>;
}

pub trait ReputationStore {
    /// Event log for (user, city), oldest first.
    fn rep_events(&self, user: &UserId, city: &CityId) -> Result<Vec<RepEvent>, StoreError>;

    /// Append an event, dropping the oldest ones beyond `cap`.
    fn append_rep_event(
        &self,
        user: &UserId,
        city: &CityId,
        event: &RepEvent,
        cap: usize,
    ) -> Result<(), StoreError>;
}

pub trait VoteWeightStore {
    /// Last stored value, `None` if the user never had an outcome applied.
    fn stored_vote_weight(&self, user: &UserId) -> Result<Option<f64>, StoreError>;

    /// Persist the new value and append its history row (keeping at most `cap` rows).
    fn put_vote_weight(
        &self,
        user: &UserId,
        value: f64,
        row: &VoteWeightRow,
        cap: usize,
    ) -> Result<(), StoreError>;

    /// History rows, oldest first.
    fn vote_weight_history(&self, user: &UserId) -> Result<Vec<VoteWeightRow>, StoreError>;
}

pub trait StakeStore {
    fn stake(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<Option<StakeRecord>, StoreError>;

    fn put_stake(&self, stake: &StakeRecord) -> Result<(), StoreError>;
}
