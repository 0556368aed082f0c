//! Platform parameters: every tunable constant of the review, trust and
//! wallet engines.
//!
//! All groups deserialize with `#[serde(default)]` so a config file only has
//! to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All platform parameters, grouped by engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformParams {
    pub quorum: QuorumParams,
    pub reputation: ReputationParams,
    pub vote_weight: VoteWeightParams,
    pub stake: StakeParams,
    pub posting: PostingParams,
}

// ── Quorum ──────────────────────────────────────────────────────────────

/// Parameters of the weighted quorum used to finalize submissions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumParams {
    /// Required share of total potential weight when nobody has been active.
    pub target_min: f64,
    /// Required share of total potential weight when every reviewer has been active.
    pub target_max: f64,
    /// Trailing window (seconds) in which a reviewer counts as active.
    pub activity_window_secs: u64,
    /// Approval-ratio threshold per module (risk tier).
    pub tau_by_module: BTreeMap<String, f64>,
    /// Approval-ratio threshold for modules without an explicit tier.
    pub default_tau: f64,
    /// Quorum-weight bonus for a verified phone number or email address.
    pub contact_bonus: f64,
    /// Quorum-weight bonus for completed KYC.
    pub kyc_bonus: f64,
    /// Quorum-weight bonus for a verified postal address.
    pub address_bonus: f64,
    /// Finalization is blocked while the reviewer pool is smaller than this.
    pub min_pool_size: usize,
    /// Moderation log retention.
    pub moderation_log_cap: usize,
}

impl QuorumParams {
    /// Lower and upper clamp for both the target percent and tau.
    pub const THRESHOLD_FLOOR: f64 = 0.5;
    pub const THRESHOLD_CEIL: f64 = 0.95;
    /// Upper clamp of a single reviewer's quorum weight.
    pub const MAX_REVIEWER_WEIGHT: f64 = 10.0;
}

impl Default for QuorumParams {
    fn default() -> Self {
        let tau_by_module = [
            ("discover", 0.55),
            ("contests", 0.55),
            ("rentals", 0.6),
            ("marketplace", 0.6),
            ("promotions", 0.65),
            ("jobs", 0.7),
        ]
        .into_iter()
        .map(|(m, t)| (m.to_string(), t))
        .collect();
        Self {
            target_min: 0.6,
            target_max: 0.8,
            activity_window_secs: 14 * 24 * 3600,
            tau_by_module,
            default_tau: 0.6,
            contact_bonus: 1.0,
            kyc_bonus: 2.0,
            address_bonus: 1.0,
            min_pool_size: 3,
            moderation_log_cap: 2000,
        }
    }
}

// ── Reputation ─────────────────────────────────────────────────────────

/// Deltas applied by the canonical reputation events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepEventWeights {
    pub vote_correct: f64,
    pub vote_wrong: f64,
    pub job_completed: f64,
    pub job_defaulted: f64,
    pub contribution_approved: f64,
    pub contribution_rejected: f64,
}

impl Default for RepEventWeights {
    fn default() -> Self {
        Self {
            vote_correct: 0.5,
            vote_wrong: -0.5,
            job_completed: 3.0,
            job_defaulted: -5.0,
            contribution_approved: 1.0,
            contribution_rejected: -1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationParams {
    pub min: f64,
    pub max: f64,
    /// Baseline score per profession.
    pub profession_baselines: BTreeMap<String, f64>,
    /// Baseline for users without a known profession.
    pub default_baseline: f64,
    pub contact_bonus: f64,
    pub kyc_bonus: f64,
    pub pan_bonus: f64,
    pub profile_complete_bonus: f64,
    pub event_weights: RepEventWeights,
    /// Per-city replacements for `event_weights`.
    pub city_overrides: BTreeMap<String, RepEventWeights>,
    /// Event log retention per (user, city).
    pub history_cap: usize,
}

impl ReputationParams {
    pub fn baseline_for(&self, profession: Option<&str>) -> f64 {
        profession
            .and_then(|p| self.profession_baselines.get(p))
            .copied()
            .unwrap_or(self.default_baseline)
    }

    pub fn weights_for(&self, city: &str) -> &RepEventWeights {
        self.city_overrides.get(city).unwrap_or(&self.event_weights)
    }
}

impl Default for ReputationParams {
    fn default() -> Self {
        let profession_baselines = [
            ("nurse", 15.0),
            ("doctor", 15.0),
            ("engineer", 12.0),
            ("student", 8.0),
        ]
        .into_iter()
        .map(|(p, b)| (p.to_string(), b))
        .collect();
        Self {
            min: 0.0,
            max: 100.0,
            profession_baselines,
            default_baseline: 10.0,
            contact_bonus: 5.0,
            kyc_bonus: 15.0,
            pan_bonus: 10.0,
            profile_complete_bonus: 5.0,
            event_weights: RepEventWeights::default(),
            city_overrides: BTreeMap::new(),
            history_cap: 2000,
        }
    }
}

// ── Vote weight ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteWeightParams {
    pub initial: f64,
    pub floor: f64,
    pub cap_free: f64,
    pub cap_member: f64,
    pub delta_correct: f64,
    pub delta_wrong: f64,
    pub history_cap: usize,
}

impl VoteWeightParams {
    pub fn cap(&self, is_member: bool) -> f64 {
        if is_member {
            self.cap_member
        } else {
            self.cap_free
        }
    }
}

impl Default for VoteWeightParams {
    fn default() -> Self {
        Self {
            initial: 1.0,
            floor: 0.5,
            cap_free: 2.0,
            cap_member: 3.0,
            delta_correct: 0.05,
            delta_wrong: -0.1,
            history_cap: 400,
        }
    }
}

// ── Stake ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakeParams {
    /// Share of current reputation locked per job.
    pub stake_percent: f64,
    /// Bonus returned on success, as a share of the stake.
    pub bonus_percent: f64,
    /// Extra penalty on default, as a share of the stake.
    pub burn_percent: f64,
}

impl Default for StakeParams {
    fn default() -> Self {
        Self {
            stake_percent: 0.1,
            bonus_percent: 0.2,
            burn_percent: 0.5,
        }
    }
}

// ── Posting ────────────────────────────────────────────────────────────

/// When pending ledger entries are posted each day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingParams {
    /// Local cutover time, `"HH:MM"`.
    pub cutover: String,
    /// Offset of local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for PostingParams {
    fn default() -> Self {
        Self {
            cutover: "20:00".to_string(),
            utc_offset_minutes: 0,
        }
    }
}
