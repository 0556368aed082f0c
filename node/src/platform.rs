//! The platform facade.
//!
//! Builds every engine over one shared store and clock, registers the
//! escrow settlement hook for the configured modules, and, when metrics are
//! enabled, counts what happens in [`PlatformMetrics`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agora_ledger::{EntryDraft, Ledger};
use agora_review::{
    Finalization, FollowupReport, QuorumInfo, ReviewEngine, SubmissionDraft, VoteResult,
};
use agora_store::{
    EscrowHold, LedgerEntry, ModerationLogEntry, PlatformStore, StakeRecord, Submission,
    TrustProfile,
};
use agora_store_lmdb::LmdbStore;
use agora_trust::{RepEventInput, ReputationEngine, StakeEngine, VoteWeightEngine};
use agora_types::{
    CityId, Clock, JobId, ModuleId, OrderId, Outcome, PlatformParams, Points, SubmissionId,
    SystemClock, UserId,
};
use agora_wallet_core::{PostingReport, PostingScheduler, WalletOps};
use tokio::sync::broadcast;

use crate::{EscrowSettlementHook, NodeError, PlatformConfig, PlatformMetrics};

pub struct Platform<S> {
    store: Arc<S>,
    params: PlatformParams,
    wallet: Arc<WalletOps<S>>,
    scheduler: Arc<PostingScheduler<S>>,
    reputation: Arc<ReputationEngine<S>>,
    vote_weight: Arc<VoteWeightEngine<S>>,
    stakes: StakeEngine<S>,
    review: ReviewEngine<S>,
    metrics: Option<Arc<PlatformMetrics>>,
}

impl Platform<LmdbStore> {
    /// Open the LMDB environment under `config.data_dir` and build the platform
    /// on the system clock.
    pub fn open(config: &PlatformConfig) -> Result<Self, NodeError> {
        let store = LmdbStore::open(Path::new(&config.data_dir), config.map_size_bytes())?;
        tracing::info!(data_dir = %config.data_dir.display(), "store opened");
        Self::new(Arc::new(store), Arc::new(SystemClock), config)
    }
}

impl<S: PlatformStore + 'static> Platform<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &PlatformConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let params = config.params.clone();
        let metrics = if config.enable_metrics {
            Some(Arc::new(PlatformMetrics::new()?))
        } else {
            None
        };

        let ledger = Arc::new(Ledger::new(Arc::clone(&store), Arc::clone(&clock)));
        let wallet = Arc::new(WalletOps::new(ledger));
        let scheduler = Arc::new(PostingScheduler::new(Arc::clone(&wallet), &params.posting)?);

        let reputation = Arc::new(ReputationEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            params.reputation.clone(),
        ));
        let vote_weight = Arc::new(VoteWeightEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            params.vote_weight.clone(),
        ));
        let stakes = StakeEngine::new(
            Arc::clone(&store),
            Arc::clone(&reputation),
            params.stake.clone(),
        );

        let mut review = ReviewEngine::new(
            Arc::clone(&store),
            clock,
            params.quorum.clone(),
            Arc::clone(&reputation),
            Arc::clone(&vote_weight),
        );
        for (module, payee) in config.escrow_payees() {
            tracing::info!(%module, %payee, "escrow settlement registered");
            let hook = EscrowSettlementHook::new(Arc::clone(&wallet), payee, metrics.clone());
            review = review.with_hook(module, Arc::new(hook));
        }

        Ok(Self {
            store,
            params,
            wallet,
            scheduler,
            reputation,
            vote_weight,
            stakes,
            review,
            metrics,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn params(&self) -> &PlatformParams {
        &self.params
    }

    /// The metrics registry, `None` unless `enable_metrics` is set.
    pub fn metrics(&self) -> Option<&Arc<PlatformMetrics>> {
        self.metrics.as_ref()
    }

    fn count(&self, f: impl FnOnce(&PlatformMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    pub fn review(&self) -> &ReviewEngine<S> {
        &self.review
    }

    pub fn wallet(&self) -> &Arc<WalletOps<S>> {
        &self.wallet
    }

    pub fn scheduler(&self) -> &Arc<PostingScheduler<S>> {
        &self.scheduler
    }

    // ── Review ──────────────────────────────────────────────────────────

    pub fn submit(&self, module: &ModuleId, draft: SubmissionDraft) -> Result<Submission, NodeError> {
        let submission = self.review.submit(module, draft)?;
        self.count(|m| m.submissions_created.inc());
        Ok(submission)
    }

    pub fn vote(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        reviewer: &UserId,
        approve: bool,
    ) -> Result<VoteResult, NodeError> {
        let result = self.review.vote(module, id, reviewer, approve)?;
        if result == VoteResult::Recorded {
            self.count(|m| m.votes_recorded.inc());
        }
        Ok(result)
    }

    pub fn try_finalize(&self, module: &ModuleId, id: &SubmissionId) -> Result<Option<Finalization>, NodeError> {
        let finalization = self.review.try_finalize(module, id)?;
        if let Some(fin) = &finalization {
            self.count(|m| {
                match fin.outcome {
                    Outcome::Approved => m.submissions_approved.inc(),
                    Outcome::Rejected => m.submissions_rejected.inc(),
                }
                if !fin.is_clean() {
                    m.finalize_followup_failures.inc();
                }
            });
        }
        Ok(finalization)
    }

    /// Record a vote and finalize if it tipped the tally.
    pub fn vote_and_finalize(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        reviewer: &UserId,
        approve: bool,
    ) -> Result<(VoteResult, Option<Finalization>), NodeError> {
        let result = self.vote(module, id, reviewer, approve)?;
        let finalization = match result {
            VoteResult::Recorded => self.try_finalize(module, id)?,
            VoteResult::Unchanged | VoteResult::Closed => None,
        };
        Ok((result, finalization))
    }

    /// Apply trust bookkeeping left over from earlier decisions.
    pub fn resume_trust_followups(&self) -> Result<FollowupReport, NodeError> {
        Ok(self.review.resume_followups()?)
    }

    pub fn ensure_reviewer(&self, city: &CityId, module: &ModuleId, user: &UserId) -> Result<bool, NodeError> {
        Ok(self.review.ensure_reviewer(city, module, user)?)
    }

    pub fn reviewers(&self, city: &CityId, module: &ModuleId) -> Result<Vec<UserId>, NodeError> {
        Ok(self.review.reviewers(city, module)?)
    }

    pub fn quorum_needed(&self, city: &CityId, module: &ModuleId) -> Result<f64, NodeError> {
        Ok(self.review.quorum_needed(city, module)?)
    }

    pub fn quorum_info(&self, city: &CityId, module: &ModuleId) -> Result<QuorumInfo, NodeError> {
        Ok(self.review.quorum_info(city, module)?)
    }

    pub fn get_submission(&self, module: &ModuleId, id: &SubmissionId) -> Result<Option<Submission>, NodeError> {
        Ok(self.review.get_submission(module, id)?)
    }

    pub fn list_pending(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, NodeError> {
        Ok(self.review.list_pending(module, city)?)
    }

    pub fn list_approved(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, NodeError> {
        Ok(self.review.list_approved(module, city)?)
    }

    pub fn list_rejected(&self, module: &ModuleId, city: Option<&CityId>) -> Result<Vec<Submission>, NodeError> {
        Ok(self.review.list_rejected(module, city)?)
    }

    pub fn moderation_log(&self, limit: usize) -> Result<Vec<ModerationLogEntry>, NodeError> {
        Ok(self.review.moderation_log(limit)?)
    }

    // ── Wallet ──────────────────────────────────────────────────────────

    pub fn balance(&self, user: &UserId) -> Result<Points, NodeError> {
        Ok(self.wallet.balance(user)?)
    }

    pub fn ledger(&self, user: &UserId) -> Result<Vec<LedgerEntry>, NodeError> {
        Ok(self.wallet.ledger_entries(user)?)
    }

    pub fn deposit(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, NodeError> {
        Ok(self.wallet.deposit_immediate(user, draft)?)
    }

    pub fn withdraw(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, NodeError> {
        Ok(self.wallet.withdraw_immediate(user, draft)?)
    }

    pub fn transfer(
        &self,
        from: &UserId,
        to: &UserId,
        draft: EntryDraft,
    ) -> Result<(LedgerEntry, LedgerEntry), NodeError> {
        Ok(self.wallet.transfer_immediate(from, to, draft)?)
    }

    pub fn create_hold(
        &self,
        order: &OrderId,
        payer: &UserId,
        amount: Points,
        memo: &str,
    ) -> Result<EscrowHold, NodeError> {
        let hold = self.wallet.create_hold(order, payer, amount, memo)?;
        self.count(|m| m.holds_created.inc());
        Ok(hold)
    }

    pub fn release_hold(&self, order: &OrderId, payee: &UserId) -> Result<EscrowHold, NodeError> {
        let hold = self.wallet.release_hold(order, payee)?;
        self.count(|m| m.holds_released.inc());
        Ok(hold)
    }

    pub fn refund_hold(&self, order: &OrderId) -> Result<EscrowHold, NodeError> {
        let hold = self.wallet.refund_hold(order)?;
        self.count(|m| m.holds_refunded.inc());
        Ok(hold)
    }

    pub fn reward_pending(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, NodeError> {
        Ok(self.wallet.reward_pending(user, draft)?)
    }

    pub fn reward_split_pending(&self, users: &[UserId], draft: EntryDraft) -> Result<Vec<LedgerEntry>, NodeError> {
        Ok(self.wallet.reward_split_pending(users, draft)?)
    }

    /// Post `user`'s pending entries if the daily cutover has passed.
    pub fn post_due(&self, user: &UserId) -> Result<usize, NodeError> {
        let posted = self.scheduler.check_user(user)?;
        self.count(|m| m.entries_posted.inc_by(posted as u64));
        Ok(posted)
    }

    /// One scheduler pass over every ledger account.
    pub fn post_all_due(&self) -> Result<PostingReport, NodeError> {
        let report = self.scheduler.check_all()?;
        self.count(|m| {
            m.entries_posted.inc_by(report.entries as u64);
            m.ledger_accounts.set(report.checked as i64);
        });
        Ok(report)
    }

    /// Run the posting scheduler until `shutdown` fires.
    pub async fn run_scheduler(&self, tick: Duration, shutdown: broadcast::Receiver<()>) {
        self.scheduler.run(tick, shutdown).await;
    }

    // ── Trust ───────────────────────────────────────────────────────────

    pub fn reputation(&self, user: &UserId, city: &CityId) -> Result<f64, NodeError> {
        Ok(self.reputation.reputation(user, city)?)
    }

    pub fn vote_weight(&self, user: &UserId) -> Result<f64, NodeError> {
        Ok(self.vote_weight.vote_weight(user)?)
    }

    pub fn profile(&self, user: &UserId) -> Result<TrustProfile, NodeError> {
        Ok(self.reputation.profile(user)?)
    }

    pub fn put_profile(&self, profile: &TrustProfile) -> Result<(), NodeError> {
        Ok(self.reputation.put_profile(profile)?)
    }

    pub fn apply_rep_event(&self, user: &UserId, city: &CityId, input: RepEventInput) -> Result<f64, NodeError> {
        Ok(self.reputation.apply_rep_event(user, city, input)?)
    }

    pub fn job_completed(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<f64, NodeError> {
        Ok(self.reputation.job_completed(user, city, job.as_str())?)
    }

    pub fn job_defaulted(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<f64, NodeError> {
        Ok(self.reputation.job_defaulted(user, city, job.as_str())?)
    }

    pub fn preview_stake(&self, user: &UserId, city: &CityId) -> Result<f64, NodeError> {
        Ok(self.stakes.preview_stake(user, city)?)
    }

    pub fn lock_stake(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<StakeRecord, NodeError> {
        Ok(self.stakes.lock_stake(user, city, job)?)
    }

    pub fn release_stake(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<StakeRecord, NodeError> {
        Ok(self.stakes.release_on_success(user, city, job)?)
    }

    pub fn burn_stake(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<StakeRecord, NodeError> {
        Ok(self.stakes.burn_on_default(user, city, job)?)
    }

    pub fn stake(&self, user: &UserId, city: &CityId, job: &JobId) -> Result<Option<StakeRecord>, NodeError> {
        Ok(self.stakes.stake(user, city, job)?)
    }
}
