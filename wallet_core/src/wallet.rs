//! Immediate and deferred wallet operations.
//!
//! `withdraw_immediate` and the escrow hold are the only places a balance is
//! checked. Every operation touching several accounts stages all changes in
//! memory and commits them in a single ledger batch.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use agora_ledger::{EntryDraft, Ledger, LedgerError};
use agora_store::{AccountLedger, LedgerEntry, LedgerStore, LedgerWrite};
use agora_types::{EntryState, Points, Timestamp, UserId};
use agora_utils::KeyedLocks;

use crate::WalletError;

pub struct WalletOps<S> {
    pub(crate) ledger: Arc<Ledger<S>>,
    /// Per-order locks for escrow. Always taken before account locks.
    pub(crate) orders: KeyedLocks,
}

/// Accounts loaded for one operation, keyed by user.
pub(crate) struct Staging<'a, S> {
    ledger: &'a Ledger<S>,
    accounts: BTreeMap<UserId, AccountLedger>,
}

impl<'a, S: LedgerStore> Staging<'a, S> {
    pub(crate) fn new(ledger: &'a Ledger<S>) -> Self {
        Self {
            ledger,
            accounts: BTreeMap::new(),
        }
    }

    pub(crate) fn account(&mut self, user: &UserId) -> Result<&mut AccountLedger, WalletError> {
        match self.accounts.entry(user.clone()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(self.ledger.load(user)?)),
        }
    }

    /// Fail with `InsufficientBalance` unless `user` can pay `amount`.
    pub(crate) fn require_balance(&mut self, user: &UserId, amount: Points) -> Result<(), WalletError> {
        let available = self
            .account(user)?
            .posted_balance()
            .ok_or_else(|| LedgerError::Overflow(user.clone()))?;
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        Ok(())
    }

    pub(crate) fn stage(
        &mut self,
        user: &UserId,
        draft: EntryDraft,
        state: EntryState,
    ) -> Result<LedgerEntry, WalletError> {
        let ledger = self.ledger;
        let account = self.account(user)?;
        Ok(ledger.stage(account, draft, state)?)
    }

    /// Commit every staged account plus `extra` writes in one batch.
    pub(crate) fn commit(self, extra: Vec<LedgerWrite>) -> Result<(), WalletError> {
        let mut writes: Vec<LedgerWrite> =
            self.accounts.into_values().map(LedgerWrite::Account).collect();
        writes.extend(extra);
        self.ledger.commit(&writes)?;
        Ok(())
    }
}

pub(crate) fn require_positive(amount: Points) -> Result<(), WalletError> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

impl<S: LedgerStore> WalletOps<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self {
            ledger,
            orders: KeyedLocks::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn now(&self) -> Timestamp {
        self.ledger.now()
    }

    /// Credit `user` immediately. `draft.amount` must be positive.
    pub fn deposit_immediate(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, WalletError> {
        require_positive(draft.amount)?;
        self.ledger.with_accounts(&[user], || {
            let mut staging = Staging::new(&self.ledger);
            let entry = staging.stage(user, draft, EntryState::Posted)?;
            staging.commit(Vec::new())?;
            tracing::info!(%user, amount = %entry.amount, "deposit");
            Ok(entry)
        })
    }

    /// Debit `user` immediately, failing without effect if the posted
    /// balance does not cover `draft.amount`.
    pub fn withdraw_immediate(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, WalletError> {
        require_positive(draft.amount)?;
        self.ledger.with_accounts(&[user], || {
            let mut staging = Staging::new(&self.ledger);
            staging.require_balance(user, draft.amount)?;
            let entry = staging.stage(user, draft.negated(), EntryState::Posted)?;
            staging.commit(Vec::new())?;
            tracing::info!(%user, amount = %entry.amount, "withdraw");
            Ok(entry)
        })
    }

    /// Move `draft.amount` from `from` to `to`. Both entries commit together.
    pub fn transfer_immediate(
        &self,
        from: &UserId,
        to: &UserId,
        draft: EntryDraft,
    ) -> Result<(LedgerEntry, LedgerEntry), WalletError> {
        require_positive(draft.amount)?;
        if from == to {
            return Err(WalletError::SelfTransfer);
        }
        self.ledger.with_accounts(&[from, to], || {
            let mut staging = Staging::new(&self.ledger);
            staging.require_balance(from, draft.amount)?;
            let debit = staging.stage(from, draft.clone().negated(), EntryState::Posted)?;
            let credit = staging.stage(to, draft, EntryState::Posted)?;
            staging.commit(Vec::new())?;
            tracing::info!(%from, %to, amount = %credit.amount, "transfer");
            Ok((debit, credit))
        })
    }

    /// Credit `user` in the pending bucket; it becomes spendable after posting.
    pub fn reward_pending(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, WalletError> {
        require_positive(draft.amount)?;
        Ok(self.ledger.append_pending(user, draft)?)
    }

    /// Split `draft.amount` evenly across `recipients`, each share rounded
    /// down to the cent, as pending credits. A recipient listed twice gets
    /// two shares.
    pub fn reward_split_pending(
        &self,
        recipients: &[UserId],
        draft: EntryDraft,
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        require_positive(draft.amount)?;
        let share = draft
            .amount
            .split_floor(recipients.len())
            .ok_or(WalletError::NoRecipients)?;
        require_positive(share)?;

        let users: Vec<&UserId> = recipients.iter().collect();
        self.ledger.with_accounts(&users, || {
            let mut staging = Staging::new(&self.ledger);
            let mut entries = Vec::with_capacity(recipients.len());
            for user in recipients {
                let mut part = draft.clone();
                part.amount = share;
                entries.push(staging.stage(user, part, EntryState::Pending)?);
            }
            staging.commit(Vec::new())?;
            tracing::info!(recipients = recipients.len(), %share, "reward split");
            Ok(entries)
        })
    }

    /// Post every pending entry of `user`. Returns the number moved.
    pub fn post_due_for_user(&self, user: &UserId) -> Result<usize, WalletError> {
        Ok(self.ledger.post_all_pending_now(user)?)
    }

    pub fn balance(&self, user: &UserId) -> Result<Points, WalletError> {
        Ok(self.ledger.compute_posted_balance(user)?)
    }

    /// Both buckets, newest first.
    pub fn ledger_entries(&self, user: &UserId) -> Result<Vec<LedgerEntry>, WalletError> {
        Ok(self.ledger.get_merged_ledger(user)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullStore};
    use proptest::prelude::*;

    pub(crate) fn wallet() -> (Arc<NullClock>, WalletOps<NullStore>) {
        let clock = Arc::new(NullClock::new(1_000));
        let ledger = Ledger::new(Arc::new(NullStore::new()), clock.clone());
        (clock, WalletOps::new(Arc::new(ledger)))
    }

    pub(crate) fn pts(n: i64) -> EntryDraft {
        EntryDraft::new(Points::whole(n), "test")
    }

    #[test]
    fn deposit_then_withdraw() {
        let (_, w) = wallet();
        let alice = UserId::new("alice");
        w.deposit_immediate(&alice, pts(100)).unwrap();
        let entry = w.withdraw_immediate(&alice, pts(30)).unwrap();
        assert_eq!(entry.amount, Points::whole(-30));
        assert_eq!(w.balance(&alice).unwrap(), Points::whole(70));
    }

    #[test]
    fn overdraft_fails_and_leaves_ledger_unchanged() {
        let (_, w) = wallet();
        let alice = UserId::new("alice");
        w.deposit_immediate(&alice, pts(10)).unwrap();
        let before = w.ledger_entries(&alice).unwrap();

        let err = w.withdraw_immediate(&alice, pts(11)).unwrap_err();
        assert!(matches!(
            err,
            WalletError::InsufficientBalance { needed, available }
                if needed == Points::whole(11) && available == Points::whole(10)
        ));
        assert_eq!(w.ledger_entries(&alice).unwrap(), before);
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        let (_, w) = wallet();
        let u = UserId::new("u");
        assert!(matches!(
            w.deposit_immediate(&u, pts(0)),
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(matches!(
            w.withdraw_immediate(&u, pts(-5)),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn transfer_moves_points_between_accounts() {
        let (_, w) = wallet();
        let (a, b) = (UserId::new("a"), UserId::new("b"));
        w.deposit_immediate(&a, pts(50)).unwrap();
        w.transfer_immediate(&a, &b, pts(20)).unwrap();
        assert_eq!(w.balance(&a).unwrap(), Points::whole(30));
        assert_eq!(w.balance(&b).unwrap(), Points::whole(20));

        assert!(matches!(
            w.transfer_immediate(&b, &a, pts(21)),
            Err(WalletError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            w.transfer_immediate(&a, &a, pts(1)),
            Err(WalletError::SelfTransfer)
        ));
        assert_eq!(w.balance(&b).unwrap(), Points::whole(20));
    }

    #[test]
    fn reward_split_floors_to_cents() {
        let (_, w) = wallet();
        let users: Vec<UserId> = ["a", "b", "c"].into_iter().map(UserId::new).collect();
        let entries = w
            .reward_split_pending(&users, EntryDraft::new(Points::whole(10), "split"))
            .unwrap();
        assert_eq!(entries.len(), 3);
        for (user, entry) in users.iter().zip(&entries) {
            assert_eq!(entry.amount, Points::from_cents(333));
            assert_eq!(entry.state, EntryState::Pending);
            assert_eq!(w.balance(user).unwrap(), Points::ZERO);
        }
        let total = Points::checked_sum(entries.iter().map(|e| e.amount)).unwrap();
        assert!(total <= Points::whole(10));

        assert!(matches!(
            w.reward_split_pending(&[], pts(10)),
            Err(WalletError::NoRecipients)
        ));
    }

    #[test]
    fn rewards_become_spendable_after_posting() {
        let (_, w) = wallet();
        let u = UserId::new("u");
        w.reward_pending(&u, pts(5)).unwrap();
        assert_eq!(w.balance(&u).unwrap(), Points::ZERO);
        assert_eq!(w.post_due_for_user(&u).unwrap(), 1);
        assert_eq!(w.balance(&u).unwrap(), Points::whole(5));
        assert_eq!(w.post_due_for_user(&u).unwrap(), 0);
    }

    #[test]
    fn concurrent_withdrawals_never_overdraw() {
        let (_, w) = wallet();
        let w = Arc::new(w);
        let u = UserId::new("u");
        w.deposit_immediate(&u, pts(10)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = Arc::clone(&w);
                let u = u.clone();
                std::thread::spawn(move || w.withdraw_immediate(&u, pts(3)).is_ok())
            })
            .collect();
        let ok = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(ok, 3);
        assert_eq!(w.balance(&u).unwrap(), Points::whole(1));
    }

    proptest! {
        #[test]
        fn split_never_exceeds_total(cents in 1i64..1_000_000, n in 1usize..20) {
            let (_, w) = wallet();
            let users: Vec<UserId> = (0..n).map(|i| UserId::new(format!("u{i}"))).collect();
            let draft = EntryDraft::new(Points::from_cents(cents), "split");
            match w.reward_split_pending(&users, draft) {
                Ok(entries) => {
                    let total = Points::checked_sum(entries.iter().map(|e| e.amount)).unwrap();
                    prop_assert!(total <= Points::from_cents(cents));
                    let remainder = Points::from_cents(cents).checked_sub(total).unwrap();
                    prop_assert!(remainder < Points::from_cents(n as i64));
                }
                Err(WalletError::InvalidAmount(_)) => prop_assert!(cents < n as i64),
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }
    }
}
