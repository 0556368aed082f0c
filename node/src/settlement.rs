//! Escrow settlement on finalization.
//!
//! The escrow hold of a submission is keyed by the submission id. Approval
//! releases it to the module's payee account, rejection refunds the payer.

use std::sync::Arc;

use agora_review::{FinalizeHook, HookError};
use agora_store::{LedgerStore, Submission};
use agora_types::{OrderId, Outcome, UserId};
use agora_wallet_core::WalletOps;

use crate::PlatformMetrics;

pub struct EscrowSettlementHook<S> {
    wallet: Arc<WalletOps<S>>,
    payee: UserId,
    metrics: Option<Arc<PlatformMetrics>>,
}

impl<S> EscrowSettlementHook<S> {
    pub fn new(wallet: Arc<WalletOps<S>>, payee: UserId, metrics: Option<Arc<PlatformMetrics>>) -> Self {
        Self {
            wallet,
            payee,
            metrics,
        }
    }

    pub fn payee(&self) -> &UserId {
        &self.payee
    }
}

impl<S: LedgerStore + Send + Sync> FinalizeHook for EscrowSettlementHook<S> {
    fn on_finalized(&self, submission: &Submission, outcome: Outcome) -> Result<(), HookError> {
        let order = OrderId::from(&submission.id);
        let hold = match outcome {
            Outcome::Approved => {
                let hold = self.wallet.release_hold(&order, &self.payee)?;
                if let Some(m) = &self.metrics {
                    m.holds_released.inc();
                }
                hold
            }
            Outcome::Rejected => {
                let hold = self.wallet.refund_hold(&order)?;
                if let Some(m) = &self.metrics {
                    m.holds_refunded.inc();
                }
                hold
            }
        };
        tracing::info!(
            %order,
            module = %submission.module,
            %outcome,
            amount = %hold.amount,
            status = ?hold.status,
            "escrow settled"
        );
        Ok(())
    }
}
