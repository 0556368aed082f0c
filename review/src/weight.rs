//! Per-review quorum weight.
//!
//! Distinct from the outcome-driven vote weight of `agora-trust`: this is
//! the weight a reviewer's vote carries in one pool's tally, derived from
//! verification flags and the reviewer's agreement history in that pool.

use std::sync::Arc;

use agora_store::{ProfileStore, ReviewerStore, TrustProfile};
use agora_types::{CityId, ModuleId, QuorumParams, UserId};

use crate::ReviewError;

pub struct QuorumWeigher<S> {
    store: Arc<S>,
    params: QuorumParams,
}

impl<S: ProfileStore + ReviewerStore> QuorumWeigher<S> {
    pub fn new(store: Arc<S>, params: QuorumParams) -> Self {
        Self { store, params }
    }

    /// Sum of the bonuses for contact, KYC and address verification.
    pub fn verification_bonus(&self, profile: &TrustProfile) -> f64 {
        let p = &self.params;
        let mut bonus = 0.0;
        if profile.contact_verified {
            bonus += p.contact_bonus;
        }
        if profile.kyc_verified {
            bonus += p.kyc_bonus;
        }
        if profile.address_verified {
            bonus += p.address_bonus;
        }
        bonus
    }

    /// `verification_bonus + accuracy × 2`, clamped to `[0, 10]`.
    pub fn quorum_weight(
        &self,
        city: &CityId,
        module: &ModuleId,
        reviewer: &UserId,
    ) -> Result<f64, ReviewError> {
        let profile = self
            .store
            .profile(reviewer)?
            .unwrap_or_else(|| TrustProfile::new(reviewer.clone()));
        let accuracy = self.store.agreement(city, module, reviewer)?.accuracy();
        let weight = self.verification_bonus(&profile) + accuracy * 2.0;
        Ok(weight.clamp(0.0, QuorumParams::MAX_REVIEWER_WEIGHT))
    }
}
