//! Review storage: submissions, vote boxes, reviewer pools, agreement
//! records and the moderation log.

use crate::StoreError;
use agora_types::{CityId, ModuleId, Outcome, SubmissionId, SubmissionStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of user-generated content awaiting (or past) moderation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub module: ModuleId,
    pub city: CityId,
    pub category: String,
    /// Who submitted the content, when known. Receives contribution reputation.
    #[serde(default)]
    pub submitter: Option<UserId>,
    /// Module-specific fields, opaque to the core.
    pub payload: serde_json::Value,
    pub status: SubmissionStatus,
    pub created_at: Timestamp,
    #[serde(default)]
    pub decided_at: Option<Timestamp>,
}

/// What a vote did to a vote box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteChange {
    /// First vote by this reviewer.
    Added,
    /// The reviewer switched sides.
    Flipped,
    /// Same choice as before; nothing changed.
    Unchanged,
}

/// Per-submission sets of reviewers who approved and who rejected.
///
/// A reviewer appears in at most one of the two sets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBox {
    pub approvals: Vec<UserId>,
    pub rejections: Vec<UserId>,
}

impl VoteBox {
    /// Record `reviewer`'s choice, replacing any earlier vote.
    pub fn cast(&mut self, reviewer: &UserId, approve: bool) -> VoteChange {
        let previous = self.choice_of(reviewer);
        if previous == Some(approve) {
            return VoteChange::Unchanged;
        }
        self.approvals.retain(|r| r != reviewer);
        self.rejections.retain(|r| r != reviewer);
        if approve {
            self.approvals.push(reviewer.clone());
        } else {
            self.rejections.push(reviewer.clone());
        }
        match previous {
            Some(_) => VoteChange::Flipped,
            None => VoteChange::Added,
        }
    }

    /// `Some(true)` for approve, `Some(false)` for reject, `None` if not voted.
    pub fn choice_of(&self, reviewer: &UserId) -> Option<bool> {
        if self.approvals.contains(reviewer) {
            Some(true)
        } else if self.rejections.contains(reviewer) {
            Some(false)
        } else {
            None
        }
    }

    /// Every voter with their choice.
    pub fn voters(&self) -> impl Iterator<Item = (&UserId, bool)> {
        self.approvals
            .iter()
            .map(|r| (r, true))
            .chain(self.rejections.iter().map(|r| (r, false)))
    }

    pub fn len(&self) -> usize {
        self.approvals.len() + self.rejections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running agreement between one reviewer and final outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub agree: u64,
    pub total: u64,
}

impl AgreementRecord {
    /// Fraction of votes that matched the outcome; 0.5 without history.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.5
        } else {
            self.agree as f64 / self.total as f64
        }
    }

    pub fn record(&mut self, agreed: bool) {
        self.total += 1;
        if agreed {
            self.agree += 1;
        }
    }
}

/// Quorum figures at the moment of decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuorumSnapshot {
    pub target_percent: f64,
    pub needed_weight: f64,
    pub total_weight: f64,
    pub tau: f64,
}

/// Vote tally at the moment of decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    pub approvals: usize,
    pub rejections: usize,
    pub approval_weight: f64,
    pub rejection_weight: f64,
    pub approval_ratio: f64,
}

/// Immutable audit record, written once per finalized submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub submission: SubmissionId,
    pub module: ModuleId,
    pub city: CityId,
    pub category: String,
    pub outcome: Outcome,
    pub decided_at: Timestamp,
    pub quorum: QuorumSnapshot,
    pub votes: VoteSnapshot,
}

/// Reputation and vote-weight work owed by a committed decision.
///
/// Written in the same commit as the decision and removed once every
/// voter and the submitter have been settled, so an interrupted
/// finalization can be resumed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrustFollowup {
    pub submission: SubmissionId,
    pub module: ModuleId,
    pub city: CityId,
    pub outcome: Outcome,
    /// Voters still to settle, with whether they agreed with the outcome.
    pub voters: Vec<(UserId, bool)>,
    /// Submitter whose contribution event is still owed.
    #[serde(default)]
    pub submitter: Option<UserId>,
}

impl TrustFollowup {
    pub fn is_settled(&self) -> bool {
        self.voters.is_empty() && self.submitter.is_none()
    }
}

/// Everything a finalization writes, committed atomically.
#[derive(Clone, Debug)]
pub struct DecisionBatch {
    /// The submission in its new terminal status.
    pub submission: Submission,
    /// Every voter with whether their vote matched the outcome. The store
    /// folds these into the stored agreement records inside the commit.
    pub agreements: Vec<(UserId, bool)>,
    pub log_entry: ModerationLogEntry,
    /// Moderation log retention; older entries are dropped.
    pub log_cap: usize,
    pub followup: TrustFollowup,
}

/// Trait for submission and vote-box storage.
pub trait SubmissionStore {
    /// Store a new submission together with its empty vote box.
    /// Fails with `Duplicate` if the id already exists in the module.
    fn create_submission(&self, submission: &Submission, votes: &VoteBox)
        -> Result<(), StoreError>;

    fn get_submission(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError>;

    /// List a module's submissions, newest first, optionally filtered by city and status.
    fn list_submissions(
        &self,
        module: &ModuleId,
        city: Option<&CityId>,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError>;

    fn get_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<VoteBox>, StoreError>;

    fn put_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        votes: &VoteBox,
    ) -> Result<(), StoreError>;
}

/// Trait for reviewer pools, activity and agreement records.
pub trait ReviewerStore {
    /// Add a reviewer to the (city, module) pool. Returns `false` if already present.
    fn add_reviewer(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<bool, StoreError>;

    /// Registered reviewers in insertion order.
    fn reviewers(&self, city: &CityId, module: &ModuleId) -> Result<Vec<UserId>, StoreError>;

    /// Stamp the reviewer's latest voting activity.
    fn record_activity(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Latest activity per reviewer for the (city, module) pool.
    fn activity(
        &self,
        city: &CityId,
        module: &ModuleId,
    ) -> Result<BTreeMap<UserId, Timestamp>, StoreError>;

    /// Agreement record of a reviewer; empty when none exists.
    fn agreement(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<AgreementRecord, StoreError>;
}

/// Trait for decision commits and the moderation log.
pub trait ModerationStore {
    /// Atomically write the terminal submission, bump the agreement records,
    /// append the log entry and store the trust followup. Fails with
    /// `Conflict` if the stored submission is no longer pending.
    fn commit_decision(&self, batch: &DecisionBatch) -> Result<(), StoreError>;

    /// Up to `limit` most recent log entries, newest first.
    fn moderation_log(&self, limit: usize) -> Result<Vec<ModerationLogEntry>, StoreError>;

    fn trust_followup(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<TrustFollowup>, StoreError>;

    /// Every followup not yet settled.
    fn trust_followups(&self) -> Result<Vec<TrustFollowup>, StoreError>;

    /// Replace the stored followup, or remove it once settled.
    fn put_trust_followup(&self, followup: &TrustFollowup) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn vote_box_keeps_reviewer_on_one_side() {
        let mut vb = VoteBox::default();
        assert_eq!(vb.cast(&user("a"), true), VoteChange::Added);
        assert_eq!(vb.cast(&user("a"), false), VoteChange::Flipped);
        assert!(vb.approvals.is_empty());
        assert_eq!(vb.rejections, vec![user("a")]);
        assert_eq!(vb.cast(&user("a"), false), VoteChange::Unchanged);
        assert_eq!(vb.len(), 1);
    }

    #[test]
    fn voters_lists_both_sides() {
        let mut vb = VoteBox::default();
        vb.cast(&user("a"), true);
        vb.cast(&user("b"), false);
        let voters: Vec<_> = vb.voters().map(|(u, c)| (u.as_str().to_string(), c)).collect();
        assert_eq!(voters, vec![("a".to_string(), true), ("b".to_string(), false)]);
    }

    #[test]
    fn accuracy_defaults_to_neutral() {
        let mut rec = AgreementRecord::default();
        assert_eq!(rec.accuracy(), 0.5);
        rec.record(true);
        rec.record(false);
        rec.record(true);
        rec.record(true);
        assert_eq!(rec.accuracy(), 0.75);
    }
}
