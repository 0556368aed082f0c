//! Nullable store: thread-safe in-memory storage.
//!
//! All state sits behind one mutex, so batch writes are trivially atomic.

use agora_store::{
    AccountLedger, AgreementRecord, DecisionBatch, EscrowHold, LedgerStore, LedgerWrite,
    ModerationLogEntry, ModerationStore, ProfileStore, RepEvent, ReputationStore, ReviewerStore,
    StakeRecord, StakeStore, StoreError, Submission, SubmissionStore, TrustFollowup, TrustProfile,
    VoteBox, VoteWeightRow, VoteWeightStore,
};
use agora_types::{CityId, JobId, ModuleId, OrderId, SubmissionId, SubmissionStatus, Timestamp, UserId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type SubmissionKey = (ModuleId, SubmissionId);
type PoolKey = (CityId, ModuleId);

#[derive(Default)]
struct Inner {
    submissions: HashMap<SubmissionKey, Submission>,
    /// Insertion order, for newest-first listing.
    submission_order: Vec<SubmissionKey>,
    vote_boxes: HashMap<SubmissionKey, VoteBox>,
    reviewers: HashMap<PoolKey, Vec<UserId>>,
    activity: HashMap<PoolKey, BTreeMap<UserId, Timestamp>>,
    agreements: HashMap<(CityId, ModuleId, UserId), AgreementRecord>,
    moderation_log: VecDeque<ModerationLogEntry>,
    trust_followups: BTreeMap<SubmissionKey, TrustFollowup>,
    ledgers: BTreeMap<UserId, AccountLedger>,
    holds: HashMap<OrderId, Vec<EscrowHold>>,
    profiles: HashMap<UserId, TrustProfile>,
    rep_events: HashMap<(UserId, CityId), VecDeque<RepEvent>>,
    vote_weights: HashMap<UserId, f64>,
    vote_weight_history: HashMap<UserId, VecDeque<VoteWeightRow>>,
    stakes: HashMap<(UserId, CityId, JobId), StakeRecord>,
}

/// An in-memory implementation of every store trait.
#[derive(Default)]
pub struct NullStore {
    inner: Mutex<Inner>,
    fail_trust_writes: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reputation and vote-weight writes fail with a backend error.
    pub fn fail_trust_writes(&self, fail: bool) {
        self.fail_trust_writes.store(fail, Ordering::SeqCst);
    }

    fn check_trust_write(&self) -> Result<(), StoreError> {
        if self.fail_trust_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("trust writes disabled".into()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

impl SubmissionStore for NullStore {
    fn create_submission(
        &self,
        submission: &Submission,
        votes: &VoteBox,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (submission.module.clone(), submission.id.clone());
        if inner.submissions.contains_key(&key) {
            return Err(StoreError::Duplicate(submission.id.to_string()));
        }
        inner.submissions.insert(key.clone(), submission.clone());
        inner.vote_boxes.insert(key.clone(), votes.clone());
        inner.submission_order.push(key);
        Ok(())
    }

    fn get_submission(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .lock()
            .submissions
            .get(&(module.clone(), id.clone()))
            .cloned())
    }

    fn list_submissions(
        &self,
        module: &ModuleId,
        city: Option<&CityId>,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .submission_order
            .iter()
            .rev()
            .filter(|(m, _)| m == module)
            .filter_map(|key| inner.submissions.get(key))
            .filter(|s| city.map_or(true, |c| &s.city == c))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect())
    }

    fn get_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<VoteBox>, StoreError> {
        Ok(self
            .lock()
            .vote_boxes
            .get(&(module.clone(), id.clone()))
            .cloned())
    }

    fn put_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        votes: &VoteBox,
    ) -> Result<(), StoreError> {
        self.lock()
            .vote_boxes
            .insert((module.clone(), id.clone()), votes.clone());
        Ok(())
    }
}

impl ReviewerStore for NullStore {
    fn add_reviewer(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let pool = inner
            .reviewers
            .entry((city.clone(), module.clone()))
            .or_default();
        if pool.contains(reviewer) {
            return Ok(false);
        }
        pool.push(reviewer.clone());
        Ok(true)
    }

    fn reviewers(&self, city: &CityId, module: &ModuleId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .lock()
            .reviewers
            .get(&(city.clone(), module.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn record_activity(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.lock()
            .activity
            .entry((city.clone(), module.clone()))
            .or_default()
            .insert(reviewer.clone(), at);
        Ok(())
    }

    fn activity(
        &self,
        city: &CityId,
        module: &ModuleId,
    ) -> Result<BTreeMap<UserId, Timestamp>, StoreError> {
        Ok(self
            .lock()
            .activity
            .get(&(city.clone(), module.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn agreement(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<AgreementRecord, StoreError> {
        Ok(self
            .lock()
            .agreements
            .get(&(city.clone(), module.clone(), reviewer.clone()))
            .copied()
            .unwrap_or_default())
    }
}

impl ModerationStore for NullStore {
    fn commit_decision(&self, batch: &DecisionBatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = &batch.submission;
        let key = (sub.module.clone(), sub.id.clone());
        match inner.submissions.get(&key) {
            None => return Err(StoreError::NotFound(sub.id.to_string())),
            Some(stored) if !stored.status.is_pending() => {
                return Err(StoreError::Conflict(format!(
                    "submission {} already {}",
                    sub.id, stored.status
                )));
            }
            Some(_) => {}
        }
        inner.submissions.insert(key.clone(), sub.clone());
        for (reviewer, agreed) in &batch.agreements {
            inner
                .agreements
                .entry((sub.city.clone(), sub.module.clone(), reviewer.clone()))
                .or_default()
                .record(*agreed);
        }
        push_capped(
            &mut inner.moderation_log,
            batch.log_entry.clone(),
            batch.log_cap,
        );
        if !batch.followup.is_settled() {
            inner.trust_followups.insert(key, batch.followup.clone());
        }
        Ok(())
    }

    fn moderation_log(&self, limit: usize) -> Result<Vec<ModerationLogEntry>, StoreError> {
        Ok(self
            .lock()
            .moderation_log
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn trust_followup(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<TrustFollowup>, StoreError> {
        Ok(self
            .lock()
            .trust_followups
            .get(&(module.clone(), id.clone()))
            .cloned())
    }

    fn trust_followups(&self) -> Result<Vec<TrustFollowup>, StoreError> {
        Ok(self.lock().trust_followups.values().cloned().collect())
    }

    fn put_trust_followup(&self, followup: &TrustFollowup) -> Result<(), StoreError> {
        let key = (followup.module.clone(), followup.submission.clone());
        let mut inner = self.lock();
        if followup.is_settled() {
            inner.trust_followups.remove(&key);
        } else {
            inner.trust_followups.insert(key, followup.clone());
        }
        Ok(())
    }
}

impl LedgerStore for NullStore {
    fn account_ledger(&self, user: &UserId) -> Result<AccountLedger, StoreError> {
        Ok(self
            .lock()
            .ledgers
            .get(user)
            .cloned()
            .unwrap_or_else(|| AccountLedger::empty(user.clone())))
    }

    fn ledger_accounts(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.lock().ledgers.keys().cloned().collect())
    }

    fn holds(&self, order: &OrderId) -> Result<Vec<EscrowHold>, StoreError> {
        Ok(self.lock().holds.get(order).cloned().unwrap_or_default())
    }

    fn write_batch(&self, writes: &[LedgerWrite]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for write in writes {
            match write {
                LedgerWrite::Account(ledger) => {
                    inner.ledgers.insert(ledger.user.clone(), ledger.clone());
                }
                LedgerWrite::Hold(hold) => {
                    let holds = inner.holds.entry(hold.order.clone()).or_default();
                    match holds.iter_mut().find(|h| h.hold_id == hold.hold_id) {
                        Some(existing) => *existing = hold.clone(),
                        None => holds.push(hold.clone()),
                    }
                }
            }
        }
        Ok(())
    }
}

impl ProfileStore for NullStore {
    fn profile(&self, user: &UserId) -> Result<Option<TrustProfile>, StoreError> {
        Ok(self.lock().profiles.get(user).cloned())
    }

    fn put_profile(&self, profile: &TrustProfile) -> Result<(), StoreError> {
        self.lock()
            .profiles
            .insert(profile.user.clone(), profile.clone());
        Ok(())
    }
}

impl ReputationStore for NullStore {
    fn rep_events(&self, user: &UserId, city: &CityId) -> Result<Vec<RepEvent>, StoreError> {
        Ok(self
            .lock()
            .rep_events
            .get(&(user.clone(), city.clone()))
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn append_rep_event(
        &self,
        user: &UserId,
        city: &CityId,
        event: &RepEvent,
        cap: usize,
    ) -> Result<(), StoreError> {
        self.check_trust_write()?;
        let mut inner = self.lock();
        let log = inner
            .rep_events
            .entry((user.clone(), city.clone()))
            .or_default();
        push_capped(log, event.clone(), cap);
        Ok(())
    }
}

impl VoteWeightStore for NullStore {
    fn stored_vote_weight(&self, user: &UserId) -> Result<Option<f64>, StoreError> {
        Ok(self.lock().vote_weights.get(user).copied())
    }

    fn put_vote_weight(
        &self,
        user: &UserId,
        value: f64,
        row: &VoteWeightRow,
        cap: usize,
    ) -> Result<(), StoreError> {
        self.check_trust_write()?;
        let mut inner = self.lock();
        inner.vote_weights.insert(user.clone(), value);
        let history = inner.vote_weight_history.entry(user.clone()).or_default();
        push_capped(history, row.clone(), cap);
        Ok(())
    }

    fn vote_weight_history(&self, user: &UserId) -> Result<Vec<VoteWeightRow>, StoreError> {
        Ok(self
            .lock()
            .vote_weight_history
            .get(user)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl StakeStore for NullStore {
    fn stake(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<Option<StakeRecord>, StoreError> {
        Ok(self
            .lock()
            .stakes
            .get(&(user.clone(), city.clone(), job.clone()))
            .cloned())
    }

    fn put_stake(&self, stake: &StakeRecord) -> Result<(), StoreError> {
        self.lock().stakes.insert(
            (stake.user.clone(), stake.city.clone(), stake.job.clone()),
            stake.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_store::{QuorumSnapshot, VoteSnapshot};
    use agora_types::{HoldStatus, Outcome, Points};

    fn submission(id: &str, city: &str, at: u64) -> Submission {
        Submission {
            id: SubmissionId::new(id),
            module: ModuleId::new("rentals"),
            city: CityId::new(city),
            category: "flat".into(),
            submitter: None,
            payload: serde_json::json!({}),
            status: SubmissionStatus::Pending,
            created_at: Timestamp::new(at),
            decided_at: None,
        }
    }

    fn followup(s: &Submission, voters: Vec<(UserId, bool)>) -> TrustFollowup {
        TrustFollowup {
            submission: s.id.clone(),
            module: s.module.clone(),
            city: s.city.clone(),
            outcome: Outcome::Approved,
            voters,
            submitter: None,
        }
    }

    fn log_entry(id: &str) -> ModerationLogEntry {
        ModerationLogEntry {
            submission: SubmissionId::new(id),
            module: ModuleId::new("rentals"),
            city: CityId::new("pune"),
            category: "flat".into(),
            outcome: Outcome::Approved,
            decided_at: Timestamp::new(10),
            quorum: QuorumSnapshot {
                target_percent: 0.6,
                needed_weight: 6.0,
                total_weight: 10.0,
                tau: 0.6,
            },
            votes: VoteSnapshot {
                approvals: 3,
                rejections: 0,
                approval_weight: 6.0,
                rejection_weight: 0.0,
                approval_ratio: 1.0,
            },
        }
    }

    #[test]
    fn duplicate_submission_rejected() {
        let store = NullStore::new();
        let s = submission("s1", "pune", 1);
        store.create_submission(&s, &VoteBox::default()).unwrap();
        let err = store.create_submission(&s, &VoteBox::default()).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn listing_is_newest_first_and_filtered() {
        let store = NullStore::new();
        for (id, city, at) in [("s1", "pune", 1), ("s2", "goa", 2), ("s3", "pune", 3)] {
            store
                .create_submission(&submission(id, city, at), &VoteBox::default())
                .unwrap();
        }
        let pune = store
            .list_submissions(&ModuleId::new("rentals"), Some(&CityId::new("pune")), None)
            .unwrap();
        let ids: Vec<_> = pune.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s1"]);
    }

    #[test]
    fn commit_decision_refuses_second_commit() {
        let store = NullStore::new();
        let s = submission("s1", "pune", 1);
        store.create_submission(&s, &VoteBox::default()).unwrap();
        let mut decided = s.clone();
        decided.status = SubmissionStatus::Approved;
        let batch = DecisionBatch {
            submission: decided,
            agreements: vec![(UserId::new("r1"), true)],
            log_entry: log_entry("s1"),
            log_cap: 10,
            followup: followup(&s, vec![(UserId::new("r1"), true)]),
        };
        store.commit_decision(&batch).unwrap();
        let err = store.commit_decision(&batch).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.moderation_log(10).unwrap().len(), 1);
        let rec = store
            .agreement(&CityId::new("pune"), &ModuleId::new("rentals"), &UserId::new("r1"))
            .unwrap();
        assert_eq!(rec, AgreementRecord { agree: 1, total: 1 });
        assert_eq!(store.trust_followups().unwrap(), vec![batch.followup.clone()]);
    }

    #[test]
    fn commits_accumulate_agreement_records() {
        let store = NullStore::new();
        let r1 = UserId::new("r1");
        for (i, agreed) in [true, false, true].into_iter().enumerate() {
            let s = submission(&format!("s{i}"), "pune", i as u64);
            store.create_submission(&s, &VoteBox::default()).unwrap();
            let mut decided = s.clone();
            decided.status = SubmissionStatus::Approved;
            store
                .commit_decision(&DecisionBatch {
                    submission: decided,
                    agreements: vec![(r1.clone(), agreed)],
                    log_entry: log_entry(s.id.as_str()),
                    log_cap: 10,
                    followup: followup(&s, vec![]),
                })
                .unwrap();
        }
        let rec = store
            .agreement(&CityId::new("pune"), &ModuleId::new("rentals"), &r1)
            .unwrap();
        assert_eq!(rec, AgreementRecord { agree: 2, total: 3 });
        assert!(store.trust_followups().unwrap().is_empty());
    }

    #[test]
    fn trust_write_failures_can_be_injected() {
        let store = NullStore::new();
        let (user, city) = (UserId::new("u"), CityId::new("pune"));
        let event = RepEvent {
            kind: agora_store::RepEventKind::Manual,
            delta: 1.0,
            reason: "adjust".into(),
            ref_id: None,
            at: Timestamp::new(1),
        };
        store.fail_trust_writes(true);
        assert!(matches!(
            store.append_rep_event(&user, &city, &event, 10),
            Err(StoreError::Backend(_))
        ));
        store.fail_trust_writes(false);
        store.append_rep_event(&user, &city, &event, 10).unwrap();
        assert_eq!(store.rep_events(&user, &city).unwrap().len(), 1);
    }

    #[test]
    fn moderation_log_is_capped() {
        let store = NullStore::new();
        for i in 0..5 {
            let id = format!("s{i}");
            let s = submission(&id, "pune", i);
            store.create_submission(&s, &VoteBox::default()).unwrap();
            let mut decided = s.clone();
            decided.status = SubmissionStatus::Approved;
            store
                .commit_decision(&DecisionBatch {
                    submission: decided,
                    agreements: vec![],
                    log_entry: log_entry(&id),
                    log_cap: 3,
                    followup: followup(&s, vec![]),
                })
                .unwrap();
        }
        let log = store.moderation_log(10).unwrap();
        let ids: Vec<_> = log.iter().map(|e| e.submission.as_str()).collect();
        assert_eq!(ids, vec!["s4", "s3", "s2"]);
    }

    #[test]
    fn hold_writes_upsert_by_id() {
        let store = NullStore::new();
        let mut hold = EscrowHold {
            hold_id: "h1".into(),
            order: OrderId::new("o1"),
            payer: UserId::new("alice"),
            payee: None,
            amount: Points::whole(5),
            status: HoldStatus::Held,
            memo: String::new(),
            created_at: Timestamp::new(1),
            resolved_at: None,
        };
        store.write_batch(&[LedgerWrite::Hold(hold.clone())]).unwrap();
        hold.status = HoldStatus::Refunded;
        store.write_batch(&[LedgerWrite::Hold(hold)]).unwrap();
        let holds = store.holds(&OrderId::new("o1")).unwrap();
        assert_eq!(holds.len(), 1);
        assert_eq!(holds[0].status, HoldStatus::Refunded);
    }

    #[test]
    fn missing_ledger_is_empty() {
        let store = NullStore::new();
        let ledger = store.account_ledger(&UserId::new("nobody")).unwrap();
        assert!(ledger.posted.is_empty());
        assert!(store.ledger_accounts().unwrap().is_empty());
    }
}
