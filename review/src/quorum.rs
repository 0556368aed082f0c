//! Quorum math.
//!
//! Pure functions: no storage, no clock. The engine gathers weights and
//! activity and feeds them through here.

use agora_store::{QuorumSnapshot, VoteSnapshot};
use agora_types::{ModuleId, Outcome, QuorumParams};
use serde::{Deserialize, Serialize};

/// Weighted votes on one submission.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tally {
    pub approvals: usize,
    pub rejections: usize,
    pub approval_weight: f64,
    pub rejection_weight: f64,
}

impl Tally {
    pub fn add(&mut self, approve: bool, weight: f64) {
        if approve {
            self.approvals += 1;
            self.approval_weight += weight;
        } else {
            self.rejections += 1;
            self.rejection_weight += weight;
        }
    }

    /// `A / (A + R)`, 0 when nobody has voted.
    pub fn approval_ratio(&self) -> f64 {
        let total = self.approval_weight + self.rejection_weight;
        if total <= 0.0 {
            0.0
        } else {
            self.approval_weight / total
        }
    }

    pub fn snapshot(&self) -> VoteSnapshot {
        VoteSnapshot {
            approvals: self.approvals,
            rejections: self.rejections,
            approval_weight: self.approval_weight,
            rejection_weight: self.rejection_weight,
            approval_ratio: self.approval_ratio(),
        }
    }
}

/// Quorum state of a (city, module) reviewer pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuorumInfo {
    pub pool_size: usize,
    pub active_reviewers: usize,
    pub total_weight: f64,
    pub target_percent: f64,
    pub needed_weight: f64,
    pub tau: f64,
}

impl QuorumInfo {
    pub fn snapshot(&self) -> QuorumSnapshot {
        QuorumSnapshot {
            target_percent: self.target_percent,
            needed_weight: self.needed_weight,
            total_weight: self.total_weight,
            tau: self.tau,
        }
    }

    /// Whether the pool is large and weighty enough to decide anything.
    pub fn can_decide(&self, params: &QuorumParams) -> bool {
        self.pool_size >= params.min_pool_size && self.total_weight > 0.0
    }
}

fn clamp_threshold(value: f64) -> f64 {
    value.clamp(QuorumParams::THRESHOLD_FLOOR, QuorumParams::THRESHOLD_CEIL)
}

/// Share of total weight required, interpolated by how much of the pool
/// voted within the activity window.
pub fn target_percent(params: &QuorumParams, active: usize, pool: usize) -> f64 {
    let fraction = if pool == 0 {
        0.0
    } else {
        (active as f64 / pool as f64).min(1.0)
    };
    clamp_threshold(params.target_min + (params.target_max - params.target_min) * fraction)
}

/// Approval-ratio threshold for `module`.
pub fn tau_for(params: &QuorumParams, module: &ModuleId) -> f64 {
    let tau = params
        .tau_by_module
        .get(module.as_str())
        .copied()
        .unwrap_or(params.default_tau);
    clamp_threshold(tau)
}

pub fn quorum_info(
    params: &QuorumParams,
    module: &ModuleId,
    pool_size: usize,
    active_reviewers: usize,
    total_weight: f64,
) -> QuorumInfo {
    let target = target_percent(params, active_reviewers, pool_size);
    QuorumInfo {
        pool_size,
        active_reviewers,
        total_weight,
        target_percent: target,
        needed_weight: total_weight * target,
        tau: tau_for(params, module),
    }
}

/// A side wins only by crossing both the weight bar and the ratio bar.
pub fn decide(tally: &Tally, needed_weight: f64, tau: f64) -> Option<Outcome> {
    let ratio = tally.approval_ratio();
    if tally.approval_weight >= needed_weight && ratio >= tau {
        Some(Outcome::Approved)
    } else if tally.rejection_weight >= needed_weight && (1.0 - ratio) >= tau {
        Some(Outcome::Rejected)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tally(approvals: &[f64], rejections: &[f64]) -> Tally {
        let mut t = Tally::default();
        approvals.iter().for_each(|w| t.add(true, *w));
        rejections.iter().for_each(|w| t.add(false, *w));
        t
    }

    #[test]
    fn three_of_five_double_weight_reviewers_approve() {
        let t = tally(&[2.0, 2.0, 2.0], &[]);
        assert_eq!(t.approval_ratio(), 1.0);
        assert_eq!(decide(&t, 10.0 * 0.6, 0.6), Some(Outcome::Approved));
    }

    #[test]
    fn five_to_one_below_quorum_stays_pending() {
        let t = tally(&[3.0, 2.0], &[1.0]);
        assert_eq!(decide(&t, 6.0, 0.6), None);
    }

    #[test]
    fn weight_without_ratio_stays_pending() {
        let t = tally(&[6.0], &[5.0]);
        assert_eq!(decide(&t, 5.0, 0.6), None);
    }

    #[test]
    fn rejection_needs_weight_and_inverse_ratio() {
        let t = tally(&[1.0], &[6.0]);
        assert_eq!(decide(&t, 6.0, 0.6), Some(Outcome::Rejected));
    }

    #[test]
    fn no_votes_ratio_is_zero() {
        let t = Tally::default();
        assert_eq!(t.approval_ratio(), 0.0);
        assert_eq!(decide(&t, 1.0, 0.6), None);
    }

    #[test]
    fn target_interpolates_with_activity() {
        let p = QuorumParams::default();
        assert_eq!(target_percent(&p, 0, 10), 0.6);
        assert!((target_percent(&p, 5, 10) - 0.7).abs() < 1e-12);
        assert!((target_percent(&p, 10, 10) - 0.8).abs() < 1e-12);
        assert_eq!(target_percent(&p, 0, 0), 0.6);
    }

    #[test]
    fn thresholds_are_clamped() {
        let p = QuorumParams {
            target_min: 0.1,
            target_max: 1.5,
            ..QuorumParams::default()
        };
        assert_eq!(target_percent(&p, 0, 4), 0.5);
        assert_eq!(target_percent(&p, 4, 4), 0.95);

        let mut p = QuorumParams::default();
        p.tau_by_module.insert("risky".into(), 0.99);
        assert_eq!(tau_for(&p, &ModuleId::new("risky")), 0.95);
        assert_eq!(tau_for(&p, &ModuleId::new("jobs")), 0.7);
        assert_eq!(tau_for(&p, &ModuleId::new("unknown")), 0.6);
    }

    #[test]
    fn tiny_or_weightless_pool_cannot_decide() {
        let p = QuorumParams::default();
        let m = ModuleId::new("discover");
        assert!(!quorum_info(&p, &m, 2, 0, 4.0).can_decide(&p));
        assert!(!quorum_info(&p, &m, 3, 0, 0.0).can_decide(&p));
        assert!(quorum_info(&p, &m, 3, 0, 3.0).can_decide(&p));
    }

    proptest! {
        #[test]
        fn never_both_sides(a in prop::collection::vec(0.0f64..10.0, 0..8),
                            r in prop::collection::vec(0.0f64..10.0, 0..8),
                            needed in 0.0f64..40.0,
                            tau in 0.5f64..0.95) {
            let t = tally(&a, &r);
            match decide(&t, needed, tau) {
                Some(Outcome::Approved) => prop_assert!(t.approval_weight >= needed),
                Some(Outcome::Rejected) => prop_assert!(t.rejection_weight >= needed),
                None => {}
            }
        }
    }
}
