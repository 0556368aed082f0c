//! LMDB implementation of the review stores.
//!
//! Submissions and vote boxes are keyed `module ++ id`; reviewer pools and
//! activity maps `city ++ module`; agreements `city ++ module ++ reviewer`.
//! Moderation log keys are zero-padded sequence numbers so iteration order
//! is insertion order. Trust followups share the submission key.

use std::collections::BTreeMap;

use agora_store::{
    AgreementRecord, DecisionBatch, ModerationLogEntry, ModerationStore, ReviewerStore, StoreError,
    Submission, SubmissionStore, TrustFollowup, VoteBox,
};
use agora_types::{CityId, ModuleId, SubmissionId, SubmissionStatus, Timestamp, UserId};

use crate::environment::{key, prefix, read_json, write_json, LmdbStore};
use crate::LmdbError;

fn submission_key(module: &ModuleId, id: &SubmissionId) -> String {
    key(&[module.as_str(), id.as_str()])
}

fn pool_key(city: &CityId, module: &ModuleId) -> String {
    key(&[city.as_str(), module.as_str()])
}

fn seq_key(seq: u64) -> String {
    format!("{seq:020}")
}

impl SubmissionStore for LmdbStore {
    fn create_submission(
        &self,
        submission: &Submission,
        votes: &VoteBox,
    ) -> Result<(), StoreError> {
        let k = submission_key(&submission.module, &submission.id);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .submissions
            .get(&wtxn, &k)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(submission.id.to_string()));
        }
        write_json(&mut wtxn, self.submissions, &k, submission)?;
        write_json(&mut wtxn, self.vote_boxes, &k, votes)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_submission(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self.get_json(self.submissions, &submission_key(module, id))?)
    }

    fn list_submissions(
        &self,
        module: &ModuleId,
        city: Option<&CityId>,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut all: Vec<Submission> =
            self.scan_prefix(self.submissions, &prefix(&[module.as_str()]))?;
        all.retain(|s| city.map_or(true, |c| &s.city == c));
        all.retain(|s| status.map_or(true, |st| s.status == st));
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn get_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<VoteBox>, StoreError> {
        Ok(self.get_json(self.vote_boxes, &submission_key(module, id))?)
    }

    fn put_vote_box(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
        votes: &VoteBox,
    ) -> Result<(), StoreError> {
        Ok(self.put_json(self.vote_boxes, &submission_key(module, id), votes)?)
    }
}

impl ReviewerStore for LmdbStore {
    fn add_reviewer(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<bool, StoreError> {
        let k = pool_key(city, module);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut pool: Vec<UserId> = read_json(&wtxn, self.reviewers, &k)?.unwrap_or_default();
        if pool.contains(reviewer) {
            return Ok(false);
        }
        pool.push(reviewer.clone());
        write_json(&mut wtxn, self.reviewers, &k, &pool)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn reviewers(&self, city: &CityId, module: &ModuleId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .get_json(self.reviewers, &pool_key(city, module))?
            .unwrap_or_default())
    }

    fn record_activity(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let k = pool_key(city, module);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut map: BTreeMap<UserId, Timestamp> =
            read_json(&wtxn, self.activity, &k)?.unwrap_or_default();
        map.insert(reviewer.clone(), at);
        write_json(&mut wtxn, self.activity, &k, &map)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn activity(
        &self,
        city: &CityId,
        module: &ModuleId,
    ) -> Result<BTreeMap<UserId, Timestamp>, StoreError> {
        Ok(self
            .get_json(self.activity, &pool_key(city, module))?
            .unwrap_or_default())
    }

    fn agreement(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<AgreementRecord, StoreError> {
        let k = key(&[city.as_str(), module.as_str(), reviewer.as_str()]);
        Ok(self.get_json(self.agreements, &k)?.unwrap_or_default())
    }
}

impl ModerationStore for LmdbStore {
    fn commit_decision(&self, batch: &DecisionBatch) -> Result<(), StoreError> {
        let sub = &batch.submission;
        let k = submission_key(&sub.module, &sub.id);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let stored: Submission = read_json(&wtxn, self.submissions, &k)?
            .ok_or_else(|| StoreError::NotFound(sub.id.to_string()))?;
        if !stored.status.is_pending() {
            return Err(StoreError::Conflict(format!(
                "submission {} already {}",
                sub.id, stored.status
            )));
        }
        write_json(&mut wtxn, self.submissions, &k, sub)?;

        for (reviewer, agreed) in &batch.agreements {
            let ak = key(&[sub.city.as_str(), sub.module.as_str(), reviewer.as_str()]);
            let mut record: AgreementRecord =
                read_json(&wtxn, self.agreements, &ak)?.unwrap_or_default();
            record.record(*agreed);
            write_json(&mut wtxn, self.agreements, &ak, &record)?;
        }
        if !batch.followup.is_settled() {
            write_json(&mut wtxn, self.trust_followups, &k, &batch.followup)?;
        }

        let next_seq = match self.moderation_log.last(&wtxn).map_err(LmdbError::from)? {
            Some((last, _)) => last.parse::<u64>().map(|s| s + 1).unwrap_or(0),
            None => 0,
        };
        write_json(
            &mut wtxn,
            self.moderation_log,
            &seq_key(next_seq),
            &batch.log_entry,
        )?;

        let len = self.moderation_log.len(&wtxn).map_err(LmdbError::from)?;
        let excess = len.saturating_sub(batch.log_cap as u64) as usize;
        if excess > 0 {
            let mut stale = Vec::with_capacity(excess);
            for item in self
                .moderation_log
                .iter(&wtxn)
                .map_err(LmdbError::from)?
                .take(excess)
            {
                let (k, _) = item.map_err(LmdbError::from)?;
                stale.push(k.to_string());
            }
            for k in stale {
                self.moderation_log
                    .delete(&mut wtxn, &k)
                    .map_err(LmdbError::from)?;
            }
        }

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn moderation_log(&self, limit: usize) -> Result<Vec<ModerationLogEntry>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for item in self
            .moderation_log
            .rev_iter(&rtxn)
            .map_err(LmdbError::from)?
            .take(limit)
        {
            let (_, bytes) = item.map_err(LmdbError::from)?;
            out.push(serde_json::from_slice(bytes).map_err(LmdbError::from)?);
        }
        Ok(out)
    }

    fn trust_followup(
        &self,
        module: &ModuleId,
        id: &SubmissionId,
    ) -> Result<Option<TrustFollowup>, StoreError> {
        Ok(self.get_json(self.trust_followups, &submission_key(module, id))?)
    }

    fn trust_followups(&self) -> Result<Vec<TrustFollowup>, StoreError> {
        Ok(self.scan_prefix(self.trust_followups, "")?)
    }

    fn put_trust_followup(&self, followup: &TrustFollowup) -> Result<(), StoreError> {
        let k = submission_key(&followup.module, &followup.submission);
        if followup.is_settled() {
            let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
            self.trust_followups
                .delete(&mut wtxn, &k)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(())
        } else {
            Ok(self.put_json(self.trust_followups, &k, followup)?)
        }
    }
}
