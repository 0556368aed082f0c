//! Outcome-driven vote weight.
//!
//! Separate from the quorum weighting used to tally a single submission:
//! this scalar only moves when a user's vote turns out to match (or not)
//! the final decision, and always stays within `[floor, cap]`.

use std::sync::Arc;

use agora_store::{VoteWeightRow, VoteWeightStore};
use agora_types::{CityId, Clock, UserId, VoteWeightParams};
use agora_utils::KeyedLocks;

use crate::TrustError;

pub struct VoteWeightEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    params: VoteWeightParams,
    locks: KeyedLocks,
}

impl<S: VoteWeightStore> VoteWeightEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, params: VoteWeightParams) -> Self {
        Self {
            store,
            clock,
            params,
            locks: KeyedLocks::new(),
        }
    }

    pub fn params(&self) -> &VoteWeightParams {
        &self.params
    }

    /// Current weight, `initial` until the first outcome is applied.
    pub fn vote_weight(&self, user: &UserId) -> Result<f64, TrustError> {
        Ok(self
            .store
            .stored_vote_weight(user)?
            .unwrap_or(self.params.initial))
    }

    /// Move the weight by the correct/wrong delta, clamp it and record the change.
    pub fn apply_vote_outcome(
        &self,
        user: &UserId,
        city: &CityId,
        is_member: bool,
        correct: bool,
    ) -> Result<f64, TrustError> {
        self.locks.with_lock(user.as_str(), || {
            self.apply(user, city, is_member, correct, None)
        })
    }

    /// Apply the outcome of decision `ref_id` unless the history already
    /// records it. Returns the new weight, or `None` when already applied.
    pub fn apply_vote_outcome_once(
        &self,
        user: &UserId,
        city: &CityId,
        is_member: bool,
        correct: bool,
        ref_id: &str,
    ) -> Result<Option<f64>, TrustError> {
        self.locks.with_lock(user.as_str(), || {
            let seen = self
                .store
                .vote_weight_history(user)?
                .iter()
                .any(|row| row.ref_id.as_deref() == Some(ref_id));
            if seen {
                tracing::debug!(%user, ref_id, "vote outcome already applied");
                return Ok(None);
            }
            self.apply(user, city, is_member, correct, Some(ref_id))
                .map(Some)
        })
    }

    fn apply(
        &self,
        user: &UserId,
        city: &CityId,
        is_member: bool,
        correct: bool,
        ref_id: Option<&str>,
    ) -> Result<f64, TrustError> {
        let previous = self.vote_weight(user)?;
        let delta = if correct {
            self.params.delta_correct
        } else {
            self.params.delta_wrong
        };
        let next = clamp_weight(previous + delta, self.params.floor, self.params.cap(is_member));
        let row = VoteWeightRow {
            at: self.clock.now(),
            city: city.clone(),
            correct,
            previous,
            next,
            ref_id: ref_id.map(str::to_string),
        };
        self.store
            .put_vote_weight(user, next, &row, self.params.history_cap)?;
        tracing::debug!(%user, %city, correct, previous, next, "vote weight updated");
        Ok(next)
    }

    /// Changes of `user`'s weight, oldest first.
    pub fn vote_weight_history(&self, user: &UserId) -> Result<Vec<VoteWeightRow>, TrustError> {
        Ok(self.store.vote_weight_history(user)?)
    }
}

/// Clamp to `[floor, cap]`, rounded to 1e-4 so repeated small deltas do not drift.
fn clamp_weight(value: f64, floor: f64, cap: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    rounded.max(floor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullStore};
    use proptest::prelude::*;

    fn engine() -> VoteWeightEngine<NullStore> {
        VoteWeightEngine::new(
            Arc::new(NullStore::new()),
            Arc::new(NullClock::new(1)),
            VoteWeightParams::default(),
        )
    }

    #[test]
    fn starts_at_initial() {
        assert_eq!(engine().vote_weight(&UserId::new("u")).unwrap(), 1.0);
    }

    #[test]
    fn correct_and_wrong_move_weight() {
        let e = engine();
        let (u, city) = (UserId::new("u"), CityId::new("pune"));
        assert_eq!(e.apply_vote_outcome(&u, &city, false, true).unwrap(), 1.05);
        assert_eq!(e.apply_vote_outcome(&u, &city, false, false).unwrap(), 0.95);

        let history = e.vote_weight_history(&u).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].previous, 1.05);
        assert_eq!(history[1].next, 0.95);
        assert!(!history[1].correct);
    }

    #[test]
    fn outcome_of_one_decision_applies_once() {
        let e = engine();
        let (u, city) = (UserId::new("u"), CityId::new("pune"));
        assert_eq!(e.apply_vote_outcome_once(&u, &city, false, true, "s1").unwrap(), Some(1.05));
        assert_eq!(e.apply_vote_outcome_once(&u, &city, false, true, "s1").unwrap(), None);
        assert_eq!(e.apply_vote_outcome_once(&u, &city, false, false, "s2").unwrap(), Some(0.95));

        let history = e.vote_weight_history(&u).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].ref_id.as_deref(), Some("s1"));
    }

    #[test]
    fn members_have_a_higher_cap() {
        let e = engine();
        let city = CityId::new("pune");
        let (free, member) = (UserId::new("free"), UserId::new("member"));
        for _ in 0..60 {
            e.apply_vote_outcome(&free, &city, false, true).unwrap();
            e.apply_vote_outcome(&member, &city, true, true).unwrap();
        }
        assert_eq!(e.vote_weight(&free).unwrap(), 2.0);
        assert_eq!(e.vote_weight(&member).unwrap(), 3.0);
    }

    #[test]
    fn never_drops_below_floor() {
        let e = engine();
        let (u, city) = (UserId::new("u"), CityId::new("pune"));
        for _ in 0..20 {
            e.apply_vote_outcome(&u, &city, false, false).unwrap();
        }
        assert_eq!(e.vote_weight(&u).unwrap(), 0.5);
    }

    #[test]
    fn lapsed_member_is_pulled_down_to_free_cap() {
        let e = engine();
        let (u, city) = (UserId::new("u"), CityId::new("pune"));
        for _ in 0..60 {
            e.apply_vote_outcome(&u, &city, true, true).unwrap();
        }
        assert_eq!(e.apply_vote_outcome(&u, &city, false, true).unwrap(), 2.0);
    }

    proptest! {
        #[test]
        fn weight_stays_within_bounds(outcomes in prop::collection::vec((any::<bool>(), any::<bool>()), 0..200)) {
            let e = engine();
            let (u, city) = (UserId::new("u"), CityId::new("pune"));
            let p = VoteWeightParams::default();
            for (is_member, correct) in outcomes {
                let w = e.apply_vote_outcome(&u, &city, is_member, correct).unwrap();
                prop_assert!(w >= p.floor);
                prop_assert!(w <= p.cap(is_member));
            }
        }
    }
}
