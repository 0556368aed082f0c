//! Reputation stakes backing jobs.
//!
//! Locking a stake deducts `stake_percent × reputation` through a
//! `StakeLock` event. On success the stake comes back with a bonus; on
//! default it stays deducted and an extra share is burnt.

use std::sync::Arc;

use agora_store::{ProfileStore, RepEventKind, ReputationStore, StakeRecord, StakeStore};
use agora_types::{CityId, JobId, StakeParams, StakeStatus, UserId};
use agora_utils::KeyedLocks;

use crate::{RepEventInput, ReputationEngine, TrustError};

pub struct StakeEngine<S> {
    store: Arc<S>,
    reputation: Arc<ReputationEngine<S>>,
    params: StakeParams,
    locks: KeyedLocks,
}

impl<S: StakeStore + ProfileStore + ReputationStore> StakeEngine<S> {
    pub fn new(store: Arc<S>, reputation: Arc<ReputationEngine<S>>, params: StakeParams) -> Self {
        Self {
            store,
            reputation,
            params,
            locks: KeyedLocks::new(),
        }
    }

    /// Amount `lock_stake` would lock right now.
    pub fn preview_stake(&self, user: &UserId, city: &CityId) -> Result<f64, TrustError> {
        Ok(self.params.stake_percent * self.reputation.reputation(user, city)?)
    }

    pub fn stake(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<Option<StakeRecord>, TrustError> {
        Ok(self.store.stake(user, city, job)?)
    }

    /// Lock a stake for `job`. A job can be staked once.
    pub fn lock_stake(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<StakeRecord, TrustError> {
        self.with_stake_lock(user, city, job, || {
            if self.store.stake(user, city, job)?.is_some() {
                return Err(TrustError::StakeExists(job.clone()));
            }
            let amount = self.preview_stake(user, city)?;
            if amount <= 0.0 {
                return Err(TrustError::NothingToStake);
            }
            let record = StakeRecord {
                user: user.clone(),
                city: city.clone(),
                job: job.clone(),
                amount,
                status: StakeStatus::Locked,
                locked_at: self.reputation.now(),
                resolved_at: None,
            };
            self.store.put_stake(&record)?;
            self.event(user, city, job, RepEventKind::StakeLock, -amount, "stake locked")?;
            tracing::info!(%user, %city, %job, amount, "stake locked");
            Ok(record)
        })
    }

    /// Return the stake plus the success bonus.
    pub fn release_on_success(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<StakeRecord, TrustError> {
        self.resolve(user, city, job, StakeStatus::Released, |engine, amount| {
            engine.event(user, city, job, RepEventKind::StakeReturn, amount, "stake returned")?;
            let bonus = amount * engine.params.bonus_percent;
            engine.event(user, city, job, RepEventKind::StakeBonus, bonus, "stake bonus")?;
            Ok(())
        })
    }

    /// Keep the stake and burn an extra share of it.
    pub fn burn_on_default(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
    ) -> Result<StakeRecord, TrustError> {
        self.resolve(user, city, job, StakeStatus::Burnt, |engine, amount| {
            let burn = amount * engine.params.burn_percent;
            engine.event(user, city, job, RepEventKind::StakeBurn, -burn, "stake burnt")?;
            Ok(())
        })
    }

    fn resolve(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
        status: StakeStatus,
        apply: impl FnOnce(&Self, f64) -> Result<(), TrustError>,
    ) -> Result<StakeRecord, TrustError> {
        self.with_stake_lock(user, city, job, || {
            let mut record = match self.store.stake(user, city, job)? {
                Some(r) if r.status == StakeStatus::Locked => r,
                _ => return Err(TrustError::NoLockedStake(job.clone())),
            };
            record.status = status;
            record.resolved_at = Some(self.reputation.now());
            self.store.put_stake(&record)?;
            apply(self, record.amount)?;
            tracing::info!(%user, %city, %job, ?status, amount = record.amount, "stake resolved");
            Ok(record)
        })
    }

    fn event(
        &self,
        user: &UserId,
        city: &CityId,
        job: &JobId,
        kind: RepEventKind,
        delta: f64,
        reason: &str,
    ) -> Result<f64, TrustError> {
        self.reputation
            .apply_rep_event(user, city, RepEventInput::new(kind, delta, reason).with_ref(job.as_str()))
    }

    fn with_stake_lock<R>(&self, user: &UserId, city: &CityId, job: &JobId, f: impl FnOnce() -> R) -> R {
        let key = format!("{user}/{city}/{job}");
        self.locks.with_lock(&key, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullStore};
    use agora_store::TrustProfile;
    use agora_types::{ReputationParams, Timestamp};

    fn engines() -> (Arc<ReputationEngine<NullStore>>, StakeEngine<NullStore>) {
        let store = Arc::new(NullStore::new());
        let rep = Arc::new(ReputationEngine::new(
            store.clone(),
            Arc::new(NullClock::new(100)),
            ReputationParams::default(),
        ));
        let stakes = StakeEngine::new(store, rep.clone(), StakeParams::default());
        (rep, stakes)
    }

    fn ids() -> (UserId, CityId, JobId) {
        (UserId::new("u"), CityId::new("pune"), JobId::new("job-1"))
    }

    #[test]
    fn preview_is_share_of_reputation() {
        let (rep, stakes) = engines();
        let (u, city, _) = ids();
        let mut p = TrustProfile::new(u.clone());
        p.kyc_verified = true;
        rep.put_profile(&p).unwrap();
        assert_eq!(stakes.preview_stake(&u, &city).unwrap(), 2.5);
    }

    #[test]
    fn lock_then_release_returns_stake_with_bonus() {
        let (rep, stakes) = engines();
        let (u, city, job) = ids();
        let record = stakes.lock_stake(&u, &city, &job).unwrap();
        assert_eq!(record.amount, 1.0);
        assert_eq!(record.locked_at, Timestamp::new(100));
        assert_eq!(rep.reputation(&u, &city).unwrap(), 9.0);

        let released = stakes.release_on_success(&u, &city, &job).unwrap();
        assert_eq!(released.status, StakeStatus::Released);
        assert!((rep.reputation(&u, &city).unwrap() - 10.2).abs() < 1e-9);
    }

    #[test]
    fn default_burns_extra_share() {
        let (rep, stakes) = engines();
        let (u, city, job) = ids();
        stakes.lock_stake(&u, &city, &job).unwrap();
        let burnt = stakes.burn_on_default(&u, &city, &job).unwrap();
        assert_eq!(burnt.status, StakeStatus::Burnt);
        assert_eq!(rep.reputation(&u, &city).unwrap(), 8.5);
    }

    #[test]
    fn job_is_staked_once_and_resolved_once() {
        let (_, stakes) = engines();
        let (u, city, job) = ids();
        stakes.lock_stake(&u, &city, &job).unwrap();
        assert!(matches!(
            stakes.lock_stake(&u, &city, &job),
            Err(TrustError::StakeExists(_))
        ));
        stakes.release_on_success(&u, &city, &job).unwrap();
        assert!(matches!(
            stakes.burn_on_default(&u, &city, &job),
            Err(TrustError::NoLockedStake(_))
        ));
        assert!(matches!(
            stakes.release_on_success(&u, &city, &JobId::new("other")),
            Err(TrustError::NoLockedStake(_))
        ));
    }

    #[test]
    fn zero_reputation_cannot_stake() {
        let (rep, stakes) = engines();
        let (u, city, job) = ids();
        for i in 0..3 {
            rep.job_defaulted(&u, &city, &format!("old-{i}")).unwrap();
        }
        assert!(matches!(
            stakes.lock_stake(&u, &city, &job),
            Err(TrustError::NothingToStake)
        ));
        assert!(stakes.stake(&u, &city, &job).unwrap().is_none());
    }
}
