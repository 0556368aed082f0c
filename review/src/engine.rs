//! Review engine: submission lifecycle, voting and finalization.
//!
//! `vote` and `try_finalize` on the same submission run under the same
//! per-submission lock. `try_finalize` returns `None` for anything that is
//! not a pending submission, so callers may invoke it after every vote.
//!
//! Trust bookkeeping owed by a decision is committed with it as a
//! [`TrustFollowup`] and drained afterwards. Whatever fails to apply stays
//! stored and is retried by a later `try_finalize` on the same submission
//! or by [`ReviewEngine::resume_followups`].

use std::collections::HashMap;
use std::sync::Arc;

use agora_store::{
    DecisionBatch, ModerationLogEntry, PlatformStore, RepEventKind, StoreError, Submission,
    TrustFollowup, VoteBox, VoteChange,
};
use agora_trust::{ReputationEngine, VoteWeightEngine};
use agora_types::{
    CityId, Clock, ModuleId, Outcome, QuorumParams, SubmissionId, SubmissionStatus, UserId,
};
use agora_utils::KeyedLocks;
use serde::{Deserialize, Serialize};

use crate::hooks::{FinalizeHook, Finalization};
use crate::quorum::{self, QuorumInfo, Tally};
use crate::weight::QuorumWeigher;
use crate::ReviewError;

/// Caller-supplied content of a new submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub city: CityId,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub submitter: Option<UserId>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// What a vote did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteResult {
    /// The vote was added or switched sides.
    Recorded,
    /// Same choice as before; nothing changed.
    Unchanged,
    /// The submission is no longer pending; the vote was ignored.
    Closed,
}

/// Outcome of a [`ReviewEngine::resume_followups`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FollowupReport {
    /// Followups fully applied during this pass.
    pub settled: usize,
    /// Followups that still have work left.
    pub outstanding: usize,
}

pub struct ReviewEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    params: QuorumParams,
    weigher: QuorumWeigher<S>,
    reputation: Arc<ReputationEngine<S>>,
    vote_weight: Arc<VoteWeightEngine<S>>,
    hooks: HashMap<ModuleId, Arc<dyn FinalizeHook>>,
    submissions: KeyedLocks,
}

impl<S: PlatformStore> ReviewEngine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        params: QuorumParams,
        reputation: Arc<ReputationEngine<S>>,
        vote_weight: Arc<VoteWeightEngine<S>>,
    ) -> Self {
        Self {
            weigher: QuorumWeigher::new(Arc::clone(&store), params.clone()),
            store,
            clock,
            params,
            reputation,
            vote_weight,
            hooks: HashMap::new(),
            submissions: KeyedLocks::new(),
        }
    }

    /// Register the hook run when a submission of `module` is finalized.
    pub fn with_hook(mut self, module: ModuleId, hook: Arc<dyn FinalizeHook>) -> Self {
        self.hooks.insert(module, hook);
        self
    }

    pub fn params(&self) -> &QuorumParams {
        &self.params
    }

    fn lock_key(module: &ModuleId, id: &SubmissionId) -> String {
        format!("{module}/{id}")
    }

    // ── Submissions ─────────────────────────────────────────────────────

    /// Create a pending submission with an empty vote box.
    pub fn submit(&self, module: &ModuleId, draft: SubmissionDraft) -> Result<Submission, ReviewError> {
        if module.is_blank() {
            return Err(ReviewError::InvalidSubmission("module is required".into()));
        }
        if draft.city.is_blank() {
            return Err(ReviewError::InvalidSubmission("city is required".into()));
        }
        if !(draft.payload.is_object() || draft.payload.is_null()) {
            return Err(ReviewError::InvalidSubmission(
                "payload must be a JSON object".into(),
            ));
        }
        let submission = Submission {
            id: SubmissionId::generate(),
            module: module.clone(),
            city: draft.city,
            category: draft.category.trim().to_string(),
            submitter: draft.submitter,
            payload: draft.payload,
            status: SubmissionStatus::Pending,
            created_at: self.clock.now(),
            decided_at: None,
        };
        self.store.create_submission(&submission, &VoteBox::default())?;
        tracing::info!(
            id = %submission.id,
            %module,
            city = %submission.city,
            category = %submission.category,
            "submission created"
        );
        Ok(submission)
    }

    pub fn get_submission(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, ReviewError> {
        Ok(self.store.get_submission(module, id)?)
    }

    pub fn vote_box(&self, module: &ModuleId, id: &SubmissionId) -> Result<Option<VoteBox>, ReviewError> {
        Ok(self.store.get_vote_box(module, id)?)
    }

    pub fn list_pending(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, ReviewError> {
        Ok(self
            .store
            .list_submissions(module, city, Some(SubmissionStatus::Pending))?)
    }

    pub fn list_approved(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, ReviewError> {
        Ok(self
            .store
            .list_submissions(module, city, Some(SubmissionStatus::Approved))?)
    }

    pub fn list_rejected(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, ReviewError> {
        Ok(self
            .store
            .list_submissions(module, city, Some(SubmissionStatus::Rejected))?)
    }

    /// Every submission of `module` regardless of status, newest first.
    pub fn list_all(&self, module: &ModuleId) -> Result<Vec<Submission>, ReviewError> {
        Ok(self.store.list_submissions(module, None, None)?)
    }

    pub fn moderation_log(&self, limit: usize) -> Result<Vec<ModerationLogEntry>, ReviewError> {
        Ok(self.store.moderation_log(limit)?)
    }

    // ── Reviewers ───────────────────────────────────────────────────────

    /// Add `user` to the pool of (city, module). Returns false if already there.
    pub fn ensure_reviewer(&self, city: &CityId, module: &ModuleId, user: &UserId) -> Result<bool, ReviewError> {
        let added = self.store.add_reviewer(city, module, user)?;
        if added {
            tracing::info!(%city, %module, reviewer = %user, "reviewer registered");
        }
        Ok(added)
    }

    pub fn reviewers(&self, city: &CityId, module: &ModuleId) -> Result<Vec<UserId>, ReviewError> {
        Ok(self.store.reviewers(city, module)?)
    }

    pub fn quorum_weight(&self, city: &CityId, module: &ModuleId, reviewer: &UserId) -> Result<f64, ReviewError> {
        self.weigher.quorum_weight(city, module, reviewer)
    }

    /// Weights of the whole pool plus the quorum they imply.
    fn assess(
        &self,
        city: &CityId,
        module: &ModuleId,
    ) -> Result<(QuorumInfo, HashMap<UserId, f64>), ReviewError> {
        let pool = self.store.reviewers(city, module)?;
        let mut weights = HashMap::with_capacity(pool.len());
        for reviewer in &pool {
            weights.insert(reviewer.clone(), self.weigher.quorum_weight(city, module, reviewer)?);
        }
        let total: f64 = weights.values().sum();

        let now = self.clock.now();
        let window = self.params.activity_window_secs;
        let activity = self.store.activity(city, module)?;
        let active = pool
            .iter()
            .filter(|r| {
                activity
                    .get(*r)
                    .is_some_and(|at| at.elapsed_since(now) <= window)
            })
            .count();

        let info = quorum::quorum_info(&self.params, module, pool.len(), active, total);
        Ok((info, weights))
    }

    pub fn quorum_info(&self, city: &CityId, module: &ModuleId) -> Result<QuorumInfo, ReviewError> {
        Ok(self.assess(city, module)?.0)
    }

    /// Weight one side must reach to decide a submission in (city, module).
    pub fn quorum_needed(&self, city: &CityId, module: &ModuleId) -> Result<f64, ReviewError> {
        Ok(self.quorum_info(city, module)?.needed_weight)
    }

    // ── Voting ──────────────────────────────────────────────────────────

    /// Cast or change a reviewer's vote.
    pub fn vote(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        reviewer: &UserId,
        approve: bool,
    ) -> Result<VoteResult, ReviewError> {
        self.submissions.with_lock(&Self::lock_key(module, id), || {
            let submission = self
                .store
                .get_submission(module, id)?
                .ok_or_else(|| ReviewError::NotFound(id.clone()))?;
            if !submission.status.is_pending() {
                tracing::debug!(%id, %reviewer, "vote on closed submission ignored");
                return Ok(VoteResult::Closed);
            }
            let city = &submission.city;
            if !self.store.reviewers(city, module)?.contains(reviewer) {
                return Err(ReviewError::NotReviewer {
                    reviewer: reviewer.clone(),
                    city: city.clone(),
                    module: module.clone(),
                });
            }

            let mut votes = self.store.get_vote_box(module, id)?.unwrap_or_default();
            let change = votes.cast(reviewer, approve);
            if change == VoteChange::Unchanged {
                return Ok(VoteResult::Unchanged);
            }
            self.store.put_vote_box(module, id, &votes)?;
            self.store
                .record_activity(city, module, reviewer, self.clock.now())?;
            tracing::debug!(%id, %reviewer, approve, ?change, "vote recorded");
            Ok(VoteResult::Recorded)
        })
    }

    // ── Finalization ────────────────────────────────────────────────────

    /// Decide the submission if the tally crosses the quorum.
    ///
    /// Returns `None` when the submission is missing, already decided, or
    /// still short of a decision.
    pub fn try_finalize(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<Finalization>, ReviewError> {
        self.submissions.with_lock(&Self::lock_key(module, id), || {
            let submission = match self.store.get_submission(module, id)? {
                Some(s) if s.status.is_pending() => s,
                Some(_) => {
                    self.resume_locked(module, id)?;
                    return Ok(None);
                }
                None => return Ok(None),
            };
            let votes = self.store.get_vote_box(module, id)?.unwrap_or_default();
            let (info, weights) = self.assess(&submission.city, module)?;
            if !info.can_decide(&self.params) {
                tracing::debug!(%id, pool = info.pool_size, total_weight = info.total_weight, "pool too small to decide");
                return Ok(None);
            }

            let mut tally = Tally::default();
            for (voter, approve) in votes.voters() {
                let weight = match weights.get(voter) {
                    Some(w) => *w,
                    None => self.weigher.quorum_weight(&submission.city, module, voter)?,
                };
                tally.add(approve, weight);
            }

            let Some(outcome) = quorum::decide(&tally, info.needed_weight, info.tau) else {
                return Ok(None);
            };
            self.commit(submission, &votes, outcome, &info, &tally)
        })
    }

    fn commit(
        &self,
        submission: Submission,
        votes: &VoteBox,
        outcome: Outcome,
        info: &QuorumInfo,
        tally: &Tally,
    ) -> Result<Option<Finalization>, ReviewError> {
        let now = self.clock.now();
        let (city, module) = (&submission.city, &submission.module);

        let mut decided = submission.clone();
        decided.status = outcome.into();
        decided.decided_at = Some(now);

        let agreements: Vec<(UserId, bool)> = votes
            .voters()
            .map(|(voter, approve)| (voter.clone(), outcome.matches_vote(approve)))
            .collect();
        let followup = TrustFollowup {
            submission: submission.id.clone(),
            module: module.clone(),
            city: city.clone(),
            outcome,
            voters: agreements.clone(),
            submitter: submission.submitter.clone(),
        };

        let log_entry = ModerationLogEntry {
            submission: submission.id.clone(),
            module: module.clone(),
            city: city.clone(),
            category: submission.category.clone(),
            outcome,
            decided_at: now,
            quorum: info.snapshot(),
            votes: tally.snapshot(),
        };
        let batch = DecisionBatch {
            submission: decided.clone(),
            agreements,
            log_entry: log_entry.clone(),
            log_cap: self.params.moderation_log_cap,
            followup,
        };
        match self.store.commit_decision(&batch) {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                tracing::debug!(id = %submission.id, %reason, "decision already committed");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            id = %submission.id,
            %module,
            %city,
            %outcome,
            approval_weight = tally.approval_weight,
            rejection_weight = tally.rejection_weight,
            needed = info.needed_weight,
            "submission finalized"
        );

        let trust_errors = self.settle_followup(batch.followup);

        let settlement_error = self.hooks.get(module).and_then(|hook| {
            hook.on_finalized(&decided, outcome).err().map(|e| {
                tracing::warn!(id = %decided.id, %module, error = %e, "finalize hook failed");
                e.to_string()
            })
        });

        Ok(Some(Finalization {
            submission: decided,
            outcome,
            log_entry,
            trust_errors,
            settlement_error,
        }))
    }

    /// Apply whatever trust work is still stored for every decided
    /// submission. Each followup is drained under its submission lock.
    pub fn resume_followups(&self) -> Result<FollowupReport, ReviewError> {
        let mut report = FollowupReport::default();
        for pending in self.store.trust_followups()? {
            let (module, id) = (&pending.module, &pending.submission);
            let settled = self
                .submissions
                .with_lock(&Self::lock_key(module, id), || self.resume_locked(module, id))?;
            if settled {
                report.settled += 1;
            } else {
                report.outstanding += 1;
            }
        }
        if report.settled + report.outstanding > 0 {
            tracing::info!(settled = report.settled, outstanding = report.outstanding, "trust followups resumed");
        }
        Ok(report)
    }

    /// Drain the stored followup of one submission, if any. Returns true
    /// when nothing is left. The caller holds the submission lock.
    fn resume_locked(&self, module: &ModuleId, id: &SubmissionId) -> Result<bool, ReviewError> {
        let Some(followup) = self.store.trust_followup(module, id)? else {
            return Ok(true);
        };
        Ok(self.settle_followup(followup).is_empty())
    }

    /// Reputation and vote-weight updates for every voter still owed, and
    /// the submitter's contribution event. Each update is keyed by the
    /// submission id, so applying a followup twice changes nothing. What
    /// fails stays in the stored followup; the errors are logged and returned.
    fn settle_followup(&self, mut followup: TrustFollowup) -> Vec<String> {
        let city = followup.city.clone();
        let ref_id = followup.submission.as_str().to_string();
        let mut errors = Vec::new();

        for (voter, correct) in std::mem::take(&mut followup.voters) {
            let result = (|| -> Result<(), ReviewError> {
                let kind = if correct {
                    RepEventKind::VoteCorrect
                } else {
                    RepEventKind::VoteWrong
                };
                self.reputation
                    .apply_canonical_once(&voter, &city, kind, &ref_id)?;
                let is_member = self.reputation.profile(&voter)?.is_member;
                self.vote_weight
                    .apply_vote_outcome_once(&voter, &city, is_member, correct, &ref_id)?;
                Ok(())
            })();
            if let Err(e) = result {
                tracing::warn!(%voter, id = %ref_id, error = %e, "trust update failed");
                errors.push(format!("{voter}: {e}"));
                followup.voters.push((voter, correct));
            }
        }

        if let Some(submitter) = followup.submitter.take() {
            let kind = match followup.outcome {
                Outcome::Approved => RepEventKind::ContributionApproved,
                Outcome::Rejected => RepEventKind::ContributionRejected,
            };
            if let Err(e) = self
                .reputation
                .apply_canonical_once(&submitter, &city, kind, &ref_id)
            {
                tracing::warn!(%submitter, id = %ref_id, error = %e, "contribution event failed");
                errors.push(format!("{submitter}: {e}"));
                followup.submitter = Some(submitter);
            }
        }

        if let Err(e) = self.store.put_trust_followup(&followup) {
            tracing::warn!(id = %ref_id, error = %e, "trust followup not saved");
            errors.push(format!("followup {ref_id}: {e}"));
        }
        errors
    }
}
