//! Ledger operations over a [`LedgerStore`].
//!
//! Read-modify-write sections on an account run under that account's lock.
//! Callers composing multi-account changes (transfers, escrow) take the
//! locks with [`Ledger::with_accounts`], stage entries with
//! [`Ledger::stage`], and commit every touched record in one
//! [`Ledger::commit`] call.

use std::iter;
use std::sync::Arc;

use agora_store::{AccountLedger, LedgerEntry, LedgerStore, LedgerWrite};
use agora_types::{CityId, Clock, EntryState, ModuleId, Points, Timestamp, UserId};
use agora_utils::KeyedLocks;

use crate::LedgerError;

/// Caller-supplied fields of a new entry. The ledger fills in id,
/// timestamp and state.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryDraft {
    pub amount: Points,
    pub reason: String,
    pub module: Option<ModuleId>,
    pub ref_id: Option<String>,
    pub city: Option<CityId>,
    pub metadata: serde_json::Value,
}

impl EntryDraft {
    pub fn new(amount: Points, reason: impl Into<String>) -> Self {
        Self {
            amount,
            reason: reason.into(),
            module: None,
            ref_id: None,
            city: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_ref(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn with_city(mut self, city: CityId) -> Self {
        self.city = Some(city);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The same draft with a negated amount.
    pub fn negated(mut self) -> Self {
        self.amount = -self.amount;
        self
    }
}

pub struct Ledger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    accounts: KeyedLocks,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            accounts: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `f` holding the locks of every listed account.
    pub fn with_accounts<R>(&self, users: &[&UserId], f: impl FnOnce() -> R) -> R {
        let keys: Vec<&str> = users.iter().map(|u| u.as_str()).collect();
        self.accounts.with_locks(&keys, f)
    }

    /// Load an account without locking.
    pub fn load(&self, user: &UserId) -> Result<AccountLedger, LedgerError> {
        Ok(self.store.account_ledger(user)?)
    }

    /// Turn a draft into an entry and prepend it to the matching bucket of
    /// an in-memory ledger. Nothing is persisted.
    pub fn stage(
        &self,
        account: &mut AccountLedger,
        draft: EntryDraft,
        state: EntryState,
    ) -> Result<LedgerEntry, LedgerError> {
        let entry = self.normalize(draft, state)?;
        let bucket = match state {
            EntryState::Pending => &mut account.pending,
            EntryState::Posted => &mut account.posted,
        };
        let amounts = bucket.iter().map(|e| e.amount).chain(iter::once(entry.amount));
        if Points::checked_sum(amounts).is_none() {
            return Err(LedgerError::Overflow(account.user.clone()));
        }
        bucket.insert(0, entry.clone());
        Ok(entry)
    }

    /// Persist every write or none.
    pub fn commit(&self, writes: &[LedgerWrite]) -> Result<(), LedgerError> {
        Ok(self.store.write_batch(writes)?)
    }

    fn normalize(&self, draft: EntryDraft, state: EntryState) -> Result<LedgerEntry, LedgerError> {
        if draft.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let reason = match draft.reason.trim() {
            "" => "unspecified".to_string(),
            r => r.to_string(),
        };
        Ok(LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            amount: draft.amount,
            reason,
            module: draft.module,
            ref_id: draft.ref_id,
            city: draft.city,
            metadata: draft.metadata,
            state,
        })
    }

    fn append(
        &self,
        user: &UserId,
        draft: EntryDraft,
        state: EntryState,
    ) -> Result<LedgerEntry, LedgerError> {
        self.with_accounts(&[user], || {
            let mut account = self.load(user)?;
            let entry = self.stage(&mut account, draft, state)?;
            self.commit(&[LedgerWrite::Account(account)])?;
            tracing::debug!(%user, amount = %entry.amount, ?state, reason = %entry.reason, "ledger entry appended");
            Ok(entry)
        })
    }

    /// Prepend an entry to the user's pending bucket.
    pub fn append_pending(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, LedgerError> {
        self.append(user, draft, EntryState::Pending)
    }

    /// Prepend an entry to the user's posted bucket.
    pub fn append_posted(&self, user: &UserId, draft: EntryDraft) -> Result<LedgerEntry, LedgerError> {
        self.append(user, draft, EntryState::Posted)
    }

    /// Move every pending entry to posted and stamp `last_posted_at`.
    ///
    /// Returns the number of entries moved. With nothing pending this only
    /// refreshes the stamp; an account that was never stored stays unstored.
    pub fn post_all_pending_now(&self, user: &UserId) -> Result<usize, LedgerError> {
        self.with_accounts(&[user], || {
            let mut account = self.load(user)?;
            if account.is_empty() {
                return Ok(0);
            }
            let moved = post_pending(&mut account, self.clock.now());
            if account.posted_balance().is_none() {
                return Err(LedgerError::Overflow(user.clone()));
            }
            self.commit(&[LedgerWrite::Account(account)])?;
            if moved > 0 {
                tracing::info!(%user, moved, "posted pending entries");
            }
            Ok(moved)
        })
    }

    pub fn compute_posted_balance(&self, user: &UserId) -> Result<Points, LedgerError> {
        self.load(user)?
            .posted_balance()
            .ok_or_else(|| LedgerError::Overflow(user.clone()))
    }

    pub fn last_posted_at(&self, user: &UserId) -> Result<Option<Timestamp>, LedgerError> {
        Ok(self.load(user)?.last_posted_at)
    }

    /// Both buckets merged, newest first. Each entry's `state` names its bucket.
    pub fn get_merged_ledger(&self, user: &UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let account = self.load(user)?;
        let mut merged: Vec<LedgerEntry> =
            account.pending.into_iter().chain(account.posted).collect();
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(merged)
    }

    /// Every user with a stored ledger.
    pub fn accounts(&self) -> Result<Vec<UserId>, LedgerError> {
        Ok(self.store.ledger_accounts()?)
    }
}

/// Move pending entries to the front of the posted bucket, keeping their
/// relative order, and stamp the posting time.
fn post_pending(account: &mut AccountLedger, now: Timestamp) -> usize {
    let moved = account.pending.len();
    let mut drained: Vec<LedgerEntry> = account
        .pending
        .drain(..)
        .map(|mut e| {
            e.state = EntryState::Posted;
            e
        })
        .collect();
    drained.append(&mut account.posted);
    account.posted = drained;
    account.last_posted_at = Some(now);
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullStore};

    fn ledger() -> (Arc<NullClock>, Ledger<NullStore>) {
        let clock = Arc::new(NullClock::new(1_000));
        let ledger = Ledger::new(Arc::new(NullStore::new()), clock.clone());
        (clock, ledger)
    }

    #[test]
    fn balance_counts_posted_only() {
        let (_, ledger) = ledger();
        let alice = UserId::new("alice");
        ledger
            .append_posted(&alice, EntryDraft::new(Points::whole(100), "deposit"))
            .unwrap();
        ledger
            .append_pending(&alice, EntryDraft::new(Points::whole(7), "reward"))
            .unwrap();
        assert_eq!(ledger.compute_posted_balance(&alice).unwrap(), Points::whole(100));
    }

    #[test]
    fn posting_moves_everything_and_stamps() {
        let (clock, ledger) = ledger();
        let alice = UserId::new("alice");
        ledger
            .append_pending(&alice, EntryDraft::new(Points::whole(1), "a"))
            .unwrap();
        clock.advance(10);
        ledger
            .append_pending(&alice, EntryDraft::new(Points::whole(2), "b"))
            .unwrap();

        assert_eq!(ledger.post_all_pending_now(&alice).unwrap(), 2);
        let account = ledger.load(&alice).unwrap();
        assert!(account.pending.is_empty());
        assert_eq!(account.posted.len(), 2);
        assert!(account.posted.iter().all(|e| e.state == EntryState::Posted));
        assert_eq!(account.posted[0].reason, "b");
        assert_eq!(account.last_posted_at, Some(Timestamp::new(1_010)));
        assert_eq!(account.posted_balance(), Some(Points::whole(3)));

        assert_eq!(ledger.post_all_pending_now(&alice).unwrap(), 0);
    }

    #[test]
    fn posting_an_unknown_account_stores_nothing() {
        let (_, ledger) = ledger();
        assert_eq!(ledger.post_all_pending_now(&UserId::new("typo")).unwrap(), 0);
        assert!(ledger.accounts().unwrap().is_empty());
        assert_eq!(ledger.last_posted_at(&UserId::new("typo")).unwrap(), None);
    }

    #[test]
    fn overflowing_credit_is_rejected_without_effect() {
        let (_, ledger) = ledger();
        let u = UserId::new("u");
        ledger
            .append_posted(&u, EntryDraft::new(Points::from_cents(i64::MAX - 10), "seed"))
            .unwrap();
        assert!(matches!(
            ledger.append_posted(&u, EntryDraft::new(Points::from_cents(11), "more")),
            Err(LedgerError::Overflow(_))
        ));
        assert_eq!(ledger.load(&u).unwrap().posted.len(), 1);
        assert_eq!(
            ledger.compute_posted_balance(&u).unwrap(),
            Points::from_cents(i64::MAX - 10)
        );

        // Posting pending entries on top would overflow the spendable balance.
        ledger
            .append_pending(&u, EntryDraft::new(Points::from_cents(11), "reward"))
            .unwrap();
        assert!(matches!(
            ledger.post_all_pending_now(&u),
            Err(LedgerError::Overflow(_))
        ));
        assert_eq!(ledger.load(&u).unwrap().pending.len(), 1);
    }

    #[test]
    fn merged_ledger_is_newest_first() {
        let (clock, ledger) = ledger();
        let bob = UserId::new("bob");
        ledger
            .append_posted(&bob, EntryDraft::new(Points::whole(5), "deposit"))
            .unwrap();
        clock.advance(5);
        ledger
            .append_pending(&bob, EntryDraft::new(Points::whole(1), "reward"))
            .unwrap();
        clock.advance(5);
        ledger
            .append_posted(&bob, EntryDraft::new(Points::whole(-2), "withdraw"))
            .unwrap();

        let merged = ledger.get_merged_ledger(&bob).unwrap();
        let reasons: Vec<_> = merged.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["withdraw", "reward", "deposit"]);
        assert_eq!(merged[1].state, EntryState::Pending);
    }

    #[test]
    fn zero_amount_is_rejected_and_blank_reason_filled() {
        let (_, ledger) = ledger();
        let u = UserId::new("u");
        assert!(matches!(
            ledger.append_posted(&u, EntryDraft::new(Points::ZERO, "x")),
            Err(LedgerError::ZeroAmount)
        ));
        let entry = ledger
            .append_posted(&u, EntryDraft::new(Points::whole(1), "  "))
            .unwrap();
        assert_eq!(entry.reason, "unspecified");
    }

    #[test]
    fn draft_tags_are_kept() {
        let (_, ledger) = ledger();
        let u = UserId::new("u");
        let draft = EntryDraft::new(Points::whole(3), "prize")
            .with_module(ModuleId::new("contests"))
            .with_city(CityId::new("goa"))
            .with_ref("sub-1")
            .with_metadata(serde_json::json!({"rank": 1}));
        let entry = ledger.append_pending(&u, draft).unwrap();
        assert_eq!(entry.module, Some(ModuleId::new("contests")));
        assert_eq!(entry.city, Some(CityId::new("goa")));
        assert_eq!(entry.ref_id.as_deref(), Some("sub-1"));
        assert_eq!(entry.metadata["rank"], 1);
        assert_eq!(ledger.accounts().unwrap(), vec![u]);
    }
}
