//! Reputation score per (user, city).
//!
//! `score = baseline(profession) + verification bonuses + Σ event deltas`,
//! clamped to `[min, max]` only when read. The event log is append-only and
//! keeps the most recent `history_cap` events.

use std::sync::Arc;

use agora_store::{ProfileStore, RepEvent, RepEventKind, ReputationStore, TrustProfile};
use agora_types::{CityId, Clock, ReputationParams, Timestamp, UserId};
use agora_utils::KeyedLocks;
use serde::{Deserialize, Serialize};

use crate::TrustError;

/// A reputation change requested by a caller. The engine stamps the time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepEventInput {
    pub kind: RepEventKind,
    pub delta: f64,
    pub reason: String,
    #[serde(default)]
    pub ref_id: Option<String>,
}

impl RepEventInput {
    pub fn new(kind: RepEventKind, delta: f64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            delta,
            reason: reason.into(),
            ref_id: None,
        }
    }

    pub fn with_ref(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }
}

pub struct ReputationEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    params: ReputationParams,
    locks: KeyedLocks,
}

impl<S: ProfileStore + ReputationStore> ReputationEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, params: ReputationParams) -> Self {
        Self {
            store,
            clock,
            params,
            locks: KeyedLocks::new(),
        }
    }

    pub fn params(&self) -> &ReputationParams {
        &self.params
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The user's profile, or an unverified one if none is stored.
    pub fn profile(&self, user: &UserId) -> Result<TrustProfile, TrustError> {
        Ok(self
            .store
            .profile(user)?
            .unwrap_or_else(|| TrustProfile::new(user.clone())))
    }

    pub fn put_profile(&self, profile: &TrustProfile) -> Result<(), TrustError> {
        self.store.put_profile(profile)?;
        tracing::debug!(user = %profile.user, "trust profile updated");
        Ok(())
    }

    /// Baseline plus verification bonuses, before any events.
    pub fn base_score(&self, profile: &TrustProfile) -> f64 {
        let p = &self.params;
        let mut score = p.baseline_for(profile.profession.as_deref());
        if profile.contact_verified {
            score += p.contact_bonus;
        }
        if profile.kyc_verified {
            score += p.kyc_bonus;
        }
        if profile.pan_verified {
            score += p.pan_bonus;
        }
        if profile.profile_complete {
            score += p.profile_complete_bonus;
        }
        score
    }

    /// Current clamped score of `user` in `city`.
    pub fn reputation(&self, user: &UserId, city: &CityId) -> Result<f64, TrustError> {
        let profile = self.profile(user)?;
        let events: f64 = self
            .store
            .rep_events(user, city)?
            .iter()
            .map(|e| e.delta)
            .sum();
        let raw = self.base_score(&profile) + events;
        Ok(raw.clamp(self.params.min, self.params.max))
    }

    /// Event log of `user` in `city`, oldest first.
    pub fn events(&self, user: &UserId, city: &CityId) -> Result<Vec<RepEvent>, TrustError> {
        Ok(self.store.rep_events(user, city)?)
    }

    /// Append an event and return the new score.
    pub fn apply_rep_event(
        &self,
        user: &UserId,
        city: &CityId,
        input: RepEventInput,
    ) -> Result<f64, TrustError> {
        self.locks
            .with_lock(&Self::lock_key(user, city), || self.append(user, city, input))
    }

    /// Apply the canonical event of `kind` unless the log already holds one
    /// with the same kind and `ref_id`. Returns the new score, or `None` when
    /// the event was already recorded.
    pub fn apply_canonical_once(
        &self,
        user: &UserId,
        city: &CityId,
        kind: RepEventKind,
        ref_id: &str,
    ) -> Result<Option<f64>, TrustError> {
        self.locks.with_lock(&Self::lock_key(user, city), || {
            let seen = self
                .store
                .rep_events(user, city)?
                .iter()
                .any(|e| e.kind == kind && e.ref_id.as_deref() == Some(ref_id));
            if seen {
                tracing::debug!(%user, %city, ?kind, ref_id, "reputation event already applied");
                return Ok(None);
            }
            let input = self.canonical_input(city, kind, ref_id);
            self.append(user, city, input).map(Some)
        })
    }

    fn lock_key(user: &UserId, city: &CityId) -> String {
        format!("{user}/{city}")
    }

    /// Append under the caller's (user, city) lock.
    fn append(&self, user: &UserId, city: &CityId, input: RepEventInput) -> Result<f64, TrustError> {
        let event = RepEvent {
            kind: input.kind,
            delta: input.delta,
            reason: input.reason,
            ref_id: input.ref_id,
            at: self.clock.now(),
        };
        self.store
            .append_rep_event(user, city, &event, self.params.history_cap)?;
        let score = self.reputation(user, city)?;
        tracing::debug!(%user, %city, kind = ?event.kind, delta = event.delta, score, "reputation event");
        Ok(score)
    }

    fn canonical_input(&self, city: &CityId, kind: RepEventKind, ref_id: &str) -> RepEventInput {
        let w = self.params.weights_for(city.as_str());
        let (delta, reason) = match kind {
            RepEventKind::VoteCorrect => (w.vote_correct, "vote matched outcome"),
            RepEventKind::VoteWrong => (w.vote_wrong, "vote against outcome"),
            RepEventKind::JobCompleted => (w.job_completed, "job completed"),
            RepEventKind::JobDefaulted => (w.job_defaulted, "job defaulted"),
            RepEventKind::ContributionApproved => (w.contribution_approved, "contribution approved"),
            RepEventKind::ContributionRejected => (w.contribution_rejected, "contribution rejected"),
            _ => (0.0, "manual"),
        };
        RepEventInput::new(kind, delta, reason).with_ref(ref_id)
    }

    fn canonical(
        &self,
        user: &UserId,
        city: &CityId,
        kind: RepEventKind,
        ref_id: &str,
    ) -> Result<f64, TrustError> {
        let input = self.canonical_input(city, kind, ref_id);
        self.apply_rep_event(user, city, input)
    }

    pub fn vote_correct(&self, user: &UserId, city: &CityId, ref_id: &str) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::VoteCorrect, ref_id)
    }

    pub fn vote_wrong(&self, user: &UserId, city: &CityId, ref_id: &str) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::VoteWrong, ref_id)
    }

    pub fn job_completed(&self, user: &UserId, city: &CityId, ref_id: &str) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::JobCompleted, ref_id)
    }

    pub fn job_defaulted(&self, user: &UserId, city: &CityId, ref_id: &str) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::JobDefaulted, ref_id)
    }

    pub fn contribution_approved(
        &self,
        user: &UserId,
        city: &CityId,
        ref_id: &str,
    ) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::ContributionApproved, ref_id)
    }

    pub fn contribution_rejected(
        &self,
        user: &UserId,
        city: &CityId,
        ref_id: &str,
    ) -> Result<f64, TrustError> {
        self.canonical(user, city, RepEventKind::ContributionRejected, ref_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullStore};
    use agora_types::RepEventWeights;

    fn engine(params: ReputationParams) -> ReputationEngine<NullStore> {
        ReputationEngine::new(Arc::new(NullStore::new()), Arc::new(NullClock::new(5)), params)
    }

    #[test]
    fn unknown_user_scores_default_baseline() {
        let e = engine(ReputationParams::default());
        let score = e.reputation(&UserId::new("u"), &CityId::new("pune")).unwrap();
        assert_eq!(score, 10.0);
    }

    #[test]
    fn verification_bonuses_add_up() {
        let e = engine(ReputationParams::default());
        let mut p = TrustProfile::new(UserId::new("u"));
        p.profession = Some("nurse".into());
        p.contact_verified = true;
        p.kyc_verified = true;
        p.pan_verified = true;
        p.profile_complete = true;
        e.put_profile(&p).unwrap();
        // 15 + 5 + 15 + 10 + 5
        assert_eq!(e.reputation(&p.user, &CityId::new("pune")).unwrap(), 50.0);
    }

    #[test]
    fn events_are_scoped_per_city() {
        let e = engine(ReputationParams::default());
        let u = UserId::new("u");
        let (pune, goa) = (CityId::new("pune"), CityId::new("goa"));
        assert_eq!(e.job_completed(&u, &pune, "job-1").unwrap(), 13.0);
        assert_eq!(e.reputation(&u, &goa).unwrap(), 10.0);
        assert_eq!(e.vote_wrong(&u, &pune, "s1").unwrap(), 12.5);

        let events = e.events(&u, &pune).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, RepEventKind::JobCompleted);
        assert_eq!(events[1].ref_id.as_deref(), Some("s1"));
    }

    #[test]
    fn score_is_clamped_on_read_only() {
        let e = engine(ReputationParams::default());
        let u = UserId::new("u");
        let city = CityId::new("pune");
        e.job_defaulted(&u, &city, "j1").unwrap();
        e.job_defaulted(&u, &city, "j2").unwrap();
        assert_eq!(e.job_defaulted(&u, &city, "j3").unwrap(), 0.0);
        // Raw score is -5 + 3; the log is not clamped.
        assert_eq!(e.job_completed(&u, &city, "j4").unwrap(), 0.0);
        assert_eq!(e.job_completed(&u, &city, "j5").unwrap(), 1.0);
    }

    #[test]
    fn city_override_weights_apply() {
        let mut params = ReputationParams::default();
        params.city_overrides.insert(
            "delhi".into(),
            RepEventWeights {
                contribution_approved: 4.0,
                ..RepEventWeights::default()
            },
        );
        let e = engine(params);
        let u = UserId::new("u");
        assert_eq!(e.contribution_approved(&u, &CityId::new("delhi"), "s").unwrap(), 14.0);
        assert_eq!(e.contribution_approved(&u, &CityId::new("pune"), "s").unwrap(), 11.0);
    }

    #[test]
    fn manual_event_uses_given_delta() {
        let e = engine(ReputationParams::default());
        let u = UserId::new("u");
        let city = CityId::new("pune");
        let score = e
            .apply_rep_event(&u, &city, RepEventInput::new(RepEventKind::Manual, 2.5, "operator"))
            .unwrap();
        assert_eq!(score, 12.5);
    }

    #[test]
    fn canonical_once_skips_a_repeated_reference() {
        let e = engine(ReputationParams::default());
        let (u, city) = (UserId::new("u"), CityId::new("pune"));
        let first = e
            .apply_canonical_once(&u, &city, RepEventKind::VoteCorrect, "s1")
            .unwrap();
        assert_eq!(first, Some(10.5));
        assert_eq!(
            e.apply_canonical_once(&u, &city, RepEventKind::VoteCorrect, "s1").unwrap(),
            None
        );
        // A different kind or reference still applies.
        assert_eq!(
            e.apply_canonical_once(&u, &city, RepEventKind::ContributionApproved, "s1")
                .unwrap(),
            Some(11.5)
        );
        assert_eq!(e.events(&u, &city).unwrap().len(), 2);
    }
}
