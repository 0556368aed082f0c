//! LMDB implementation of the trust stores.

use agora_store::{
    ProfileStore, RepEvent, ReputationStore, StakeRecord, StakeStore, StoreError, TrustProfile,
    VoteWeightRow, VoteWeightStore,
};
use agora_types::{CityId, JobId, UserId};
use serde::{Deserialize, Serialize};

use crate::environment::{key, read_json, write_json, LmdbStore};
use crate::LmdbError;

/// Stored vote weight with its capped history.
#[derive(Default, Serialize, Deserialize)]
struct VoteWeightDoc {
    value: Option<f64>,
    history: Vec<VoteWeightRow>,
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

impl ProfileStore for LmdbStore {
    fn profile(&self, user: &UserId) -> Result<Option<TrustProfile>, StoreError> {
        Ok(self.get_json(self.profiles, user.as_str())?)
    }

    fn put_profile(&self, profile: &TrustProfile) -> Result<(), StoreError> {
        Ok(self.put_json(self.profiles, profile.user.as_str(), profile)?)
    }
}

impl ReputationStore for LmdbStore {
    fn rep_events(&self, user: &UserId, city: &CityId) -> Result<Vec<RepEvent>, StoreError> {
        Ok(self
            .get_json(self.rep_events, &key(&[user.as_str(), city.as_str()]))?
            .unwrap_or_default())
    }

    fn append_rep_event(
        &self,
        user: &UserId,
        city: &CityId,
        event: &RepEvent,
        cap: usize,
    ) -> Result<(), StoreError> {
        let k = key(&[user.as_str(), city.as_str()]);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut events: Vec<RepEvent> = read_json(&wtxn, self.rep_events, &k)?.unwrap_or_default();
        events.push(event.clone());
        trim_front(&mut events, cap);
        write_json(&mut wtxn, self.rep_events, &k, &events)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

impl VoteWeightStore for LmdbStore {
    fn stored_vote_weight(&self, user: &UserId) -> Result<Option<f64>, StoreError> {
        let doc: Option<VoteWeightDoc> = self.get_json(self.vote_weights, user.as_str())?;
        Ok(doc.and_then(|d| d.value))
    }

    fn put_vote_weight(
        &self,
        user: &UserId,
        value: f64,
        row: &VoteWeightRow,
        cap: usize,
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut doc: VoteWeightDoc =
            read_json(&wtxn, self.vote_weights, user.as_str())?.unwrap_or_default();
        doc.value = Some(value);
        doc.history.push(row.clone());
        trim_front(&mut doc.history, cap);
        write_json(&mut wtxn, self.vote_weights, user.as_str(), &doc)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn vote_weight_history(&self, user: &UserId) -> Result<Vec<VoteWeightRow>, StoreError> {
        let doc: Option<VoteWeightDoc> = self.get_json(self.vote_weights, user.as_str())?;
        Ok(doc.map(|d| d.history).unwrap_or_default())
    }
}

impl StakeStore for LmdbStore {
    fn stake(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<Option<StakeRecord>, StoreError> {
        let k = key(&[user.as_str(), city.as_str(), job.as_str()]);
        Ok(self.get_json(self.stakes, &k)?)
    }

    fn put_stake(&self, stake: &StakeRecord) -> Result<(), StoreError> {
        let k = key(&[stake.user.as_str(), stake.city.as_str(), stake.job.as_str()]);
        Ok(self.put_json(self.stakes, &k, stake)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::temp_store;
    use agora_store::RepEventKind;
    use agora_types::Timestamp;

    #[test]
    fn rep_events_are_capped_oldest_first() {
        let (_dir, store) = temp_store();
        let (user, city) = (UserId::new("u"), CityId::new("pune"));
        for i in 0..5 {
            let ev = RepEvent {
                kind: RepEventKind::VoteCorrect,
                delta: i as f64,
                reason: "vote".into(),
                ref_id: None,
                at: Timestamp::new(i),
            };
            store.append_rep_event(&user, &city, &ev, 3).unwrap();
        }
        let deltas: Vec<f64> = store
            .rep_events(&user, &city)
            .unwrap()
            .iter()
            .map(|e| e.delta)
            .collect();
        assert_eq!(deltas, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn vote_weight_value_and_history() {
        let (_dir, store) = temp_store();
        let user = UserId::new("u");
        assert_eq!(store.stored_vote_weight(&user).unwrap(), None);
        let row = VoteWeightRow {
            at: Timestamp::new(1),
            city: CityId::new("pune"),
            correct: true,
            previous: 1.0,
            next: 1.05,
            ref_id: Some("s1".into()),
        };
        store.put_vote_weight(&user, 1.05, &row, 400).unwrap();
        assert_eq!(store.stored_vote_weight(&user).unwrap(), Some(1.05));
        assert_eq!(store.vote_weight_history(&user).unwrap(), vec![row]);
    }

    #[test]
    fn profile_round_trip() {
        let (_dir, store) = temp_store();
        let mut p = TrustProfile::new(UserId::new("u"));
        p.kyc_verified = true;
        store.put_profile(&p).unwrap();
        assert_eq!(store.profile(&UserId::new("u")).unwrap(), Some(p));
    }
}
