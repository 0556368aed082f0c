//! Escrow holds.
//!
//! A hold withdraws from the payer and parks the amount under an order id
//! until it is released to a payee or refunded to the payer. An order has
//! at most one `held` hold at a time; released and refunded are terminal.
//! The ledger entries and the hold record of each transition are committed
//! in one batch.

use agora_ledger::EntryDraft;
use agora_store::{EscrowHold, LedgerStore, LedgerWrite};
use agora_types::{EntryState, HoldStatus, OrderId, Points, UserId};

use crate::wallet::{require_positive, Staging, WalletOps};
use crate::WalletError;

impl<S: LedgerStore> WalletOps<S> {
    /// Withdraw `amount` from `payer` and record it as held for `order`.
    pub fn create_hold(
        &self,
        order: &OrderId,
        payer: &UserId,
        amount: Points,
        memo: &str,
    ) -> Result<EscrowHold, WalletError> {
        require_positive(amount)?;
        self.orders.with_lock(order.as_str(), || {
            if self.active_hold(order)?.is_some() {
                return Err(WalletError::HoldExists(order.clone()));
            }
            self.ledger.with_accounts(&[payer], || {
                let mut staging = Staging::new(&self.ledger);
                staging.require_balance(payer, amount)?;
                let draft = EntryDraft::new(-amount, "escrow_hold").with_ref(order.as_str());
                staging.stage(payer, draft, EntryState::Posted)?;

                let hold = EscrowHold {
                    hold_id: uuid::Uuid::new_v4().to_string(),
                    order: order.clone(),
                    payer: payer.clone(),
                    payee: None,
                    amount,
                    status: HoldStatus::Held,
                    memo: memo.to_string(),
                    created_at: self.now(),
                    resolved_at: None,
                };
                staging.commit(vec![LedgerWrite::Hold(hold.clone())])?;
                tracing::info!(%order, %payer, %amount, "escrow hold created");
                Ok(hold)
            })
        })
    }

    /// Pay the held amount of `order` to `payee`.
    pub fn release_hold(&self, order: &OrderId, payee: &UserId) -> Result<EscrowHold, WalletError> {
        self.resolve(order, HoldStatus::Released, Some(payee))
    }

    /// Return the held amount of `order` to its payer.
    pub fn refund_hold(&self, order: &OrderId) -> Result<EscrowHold, WalletError> {
        self.resolve(order, HoldStatus::Refunded, None)
    }

    fn resolve(
        &self,
        order: &OrderId,
        status: HoldStatus,
        payee: Option<&UserId>,
    ) -> Result<EscrowHold, WalletError> {
        self.orders.with_lock(order.as_str(), || {
            let mut hold = self
                .active_hold(order)?
                .ok_or_else(|| WalletError::NoActiveHold(order.clone()))?;
            let (recipient, reason) = match payee {
                Some(payee) => (payee.clone(), "escrow_release"),
                None => (hold.payer.clone(), "escrow_refund"),
            };

            self.ledger.with_accounts(&[&recipient], || {
                let mut staging = Staging::new(&self.ledger);
                let draft = EntryDraft::new(hold.amount, reason).with_ref(order.as_str());
                staging.stage(&recipient, draft, EntryState::Posted)?;

                hold.status = status;
                hold.payee = payee.cloned();
                hold.resolved_at = Some(self.now());
                staging.commit(vec![LedgerWrite::Hold(hold.clone())])?;
                tracing::info!(%order, %recipient, amount = %hold.amount, ?status, "escrow hold resolved");
                Ok(hold)
            })
        })
    }

    /// Every hold recorded for `order`, oldest first.
    pub fn holds(&self, order: &OrderId) -> Result<Vec<EscrowHold>, WalletError> {
        Ok(self.ledger.store().holds(order)?)
    }

    /// The hold of `order` still in `held` state, if any.
    pub fn active_hold(&self, order: &OrderId) -> Result<Option<EscrowHold>, WalletError> {
        Ok(self
            .holds(order)?
            .into_iter()
            .find(|h| h.status == HoldStatus::Held))
    }
}
