//! Prometheus metrics for the Agora platform.
//!
//! [`PlatformMetrics`] owns a dedicated [`Registry`]; [`PlatformMetrics::encode`]
//! renders it in the Prometheus text exposition format for whatever surface
//! serves `/metrics`.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

use crate::NodeError;

/// Counters covering submissions, votes, decisions and money movements.
pub struct PlatformMetrics {
    pub registry: Registry,

    // ── Review ──────────────────────────────────────────────────────────
    pub submissions_created: IntCounter,
    pub votes_recorded: IntCounter,
    pub submissions_approved: IntCounter,
    pub submissions_rejected: IntCounter,
    /// Finalizations whose settlement hook or trust updates failed.
    pub finalize_followup_failures: IntCounter,

    // ── Wallet ──────────────────────────────────────────────────────────
    pub holds_created: IntCounter,
    pub holds_released: IntCounter,
    pub holds_refunded: IntCounter,
    pub entries_posted: IntCounter,
    /// Accounts known to the ledger at the last posting pass.
    pub ledger_accounts: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
}

impl PlatformMetrics {
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();

        let submissions_created = counter(
            &registry,
            "agora_submissions_created_total",
            "Submissions entered into review",
        )?;
        let votes_recorded = counter(
            &registry,
            "agora_votes_recorded_total",
            "Votes added or flipped",
        )?;
        let submissions_approved = counter(
            &registry,
            "agora_submissions_approved_total",
            "Submissions finalized as approved",
        )?;
        let submissions_rejected = counter(
            &registry,
            "agora_submissions_rejected_total",
            "Submissions finalized as rejected",
        )?;
        let finalize_followup_failures = counter(
            &registry,
            "agora_finalize_followup_failures_total",
            "Finalizations with a failed settlement or trust update",
        )?;
        let holds_created = counter(
            &registry,
            "agora_escrow_holds_created_total",
            "Escrow holds created",
        )?;
        let holds_released = counter(
            &registry,
            "agora_escrow_holds_released_total",
            "Escrow holds released to a payee",
        )?;
        let holds_refunded = counter(
            &registry,
            "agora_escrow_holds_refunded_total",
            "Escrow holds refunded to the payer",
        )?;
        let entries_posted = counter(
            &registry,
            "agora_ledger_entries_posted_total",
            "Pending ledger entries moved to posted",
        )?;
        let ledger_accounts = register_int_gauge_with_registry!(
            Opts::new("agora_ledger_accounts", "Accounts with a ledger"),
            registry
        )?;

        Ok(Self {
            registry,
            submissions_created,
            votes_recorded,
            submissions_approved,
            submissions_rejected,
            finalize_followup_failures,
            holds_created,
            holds_released,
            holds_refunded,
            entries_posted,
            ledger_accounts,
        })
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| NodeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_counters() {
        let m = PlatformMetrics::new().unwrap();
        m.submissions_created.inc();
        m.holds_created.inc_by(2);
        let text = m.encode().unwrap();
        assert!(text.contains("agora_submissions_created_total 1"));
        assert!(text.contains("agora_escrow_holds_created_total 2"));
        assert!(text.contains("agora_ledger_accounts 0"));
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = PlatformMetrics::new().unwrap();
        let b = PlatformMetrics::new().unwrap();
        a.votes_recorded.inc();
        assert_eq!(b.votes_recorded.get(), 0);
    }
}
