//! LMDB implementation of the ledger store.
//!
//! One JSON document per account ledger, one JSON list of holds per order.
//! A batch is applied inside a single write transaction.

use agora_store::{AccountLedger, EscrowHold, LedgerStore, LedgerWrite, StoreError};
use agora_types::{OrderId, UserId};

use crate::environment::{read_json, write_json, LmdbStore};
use crate::LmdbError;

impl LedgerStore for LmdbStore {
    fn account_ledger(&self, user: &UserId) -> Result<AccountLedger, StoreError> {
        Ok(self
            .get_json(self.ledgers, user.as_str())?
            .unwrap_or_else(|| AccountLedger::empty(user.clone())))
    }

    fn ledger_accounts(&self) -> Result<Vec<UserId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for item in self.ledgers.iter(&rtxn).map_err(LmdbError::from)? {
            let (user, _) = item.map_err(LmdbError::from)?;
            out.push(UserId::new(user));
        }
        Ok(out)
    }

    fn holds(&self, order: &OrderId) -> Result<Vec<EscrowHold>, StoreError> {
        Ok(self.get_json(self.holds, order.as_str())?.unwrap_or_default())
    }

    fn write_batch(&self, writes: &[LedgerWrite]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for write in writes {
            match write {
                LedgerWrite::Account(ledger) => {
                    write_json(&mut wtxn, self.ledgers, ledger.user.as_str(), ledger)?;
                }
                LedgerWrite::Hold(hold) => {
                    let mut holds: Vec<EscrowHold> =
                        read_json(&wtxn, self.holds, hold.order.as_str())?.unwrap_or_default();
                    match holds.iter_mut().find(|h| h.hold_id == hold.hold_id) {
                        Some(existing) => *existing = hold.clone(),
                        None => holds.push(hold.clone()),
                    }
                    write_json(&mut wtxn, self.holds, hold.order.as_str(), &holds)?;
                }
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
