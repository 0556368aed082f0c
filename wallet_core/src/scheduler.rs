//! Daily posting of pending ledger entries.
//!
//! Once local time passes the configured cutover, each account is posted at
//! most once per local day. The "already posted today" check reads the
//! persisted `last_posted_at` stamp, so redundant checks are no-ops.

use std::sync::Arc;
use std::time::Duration;

use agora_store::LedgerStore;
use agora_types::{PostingParams, UserId};
use chrono::{FixedOffset, NaiveTime};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{WalletError, WalletOps};

/// Result of one pass over every account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PostingReport {
    /// Accounts looked at.
    pub checked: usize,
    /// Accounts that were due and got posted.
    pub posted_accounts: usize,
    /// Entries moved from pending to posted.
    pub entries: usize,
}

pub struct PostingScheduler<S> {
    wallet: Arc<WalletOps<S>>,
    cutover: NaiveTime,
    offset: FixedOffset,
}

impl<S: LedgerStore> PostingScheduler<S> {
    pub fn new(wallet: Arc<WalletOps<S>>, params: &PostingParams) -> Result<Self, WalletError> {
        let cutover = NaiveTime::parse_from_str(&params.cutover, "%H:%M").map_err(|e| {
            WalletError::InvalidSchedule(format!("cutover {:?}: {e}", params.cutover))
        })?;
        let offset = FixedOffset::east_opt(params.utc_offset_minutes * 60).ok_or_else(|| {
            WalletError::InvalidSchedule(format!(
                "utc offset {} minutes out of range",
                params.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            wallet,
            cutover,
            offset,
        })
    }

    /// Whether `user` should be posted now.
    pub fn is_due(&self, user: &UserId) -> Result<bool, WalletError> {
        let local = self.wallet.now().local(self.offset);
        if local.time() < self.cutover {
            return Ok(false);
        }
        let last = self.wallet.ledger().last_posted_at(user)?;
        Ok(last.map_or(true, |t| t.local_date(self.offset) != local.date()))
    }

    /// Post `user` if due. Returns the number of entries moved.
    pub fn check_user(&self, user: &UserId) -> Result<usize, WalletError> {
        if !self.is_due(user)? {
            return Ok(0);
        }
        self.wallet.post_due_for_user(user)
    }

    /// Check every account with a ledger.
    pub fn check_all(&self) -> Result<PostingReport, WalletError> {
        let mut report = PostingReport::default();
        for user in self.wallet.ledger().accounts()? {
            report.checked += 1;
            if self.is_due(&user)? {
                report.entries += self.wallet.post_due_for_user(&user)?;
                report.posted_accounts += 1;
            }
        }
        Ok(report)
    }

    /// Run `check_all` now and then every `tick` until `shutdown` fires.
    ///
    /// Errors of one pass are logged and the loop keeps going.
    pub async fn run(&self, tick: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(tick);
        tracing::info!(cutover = %self.cutover, tick_secs = tick.as_secs(), "posting scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("posting scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.check_all() {
                        Ok(report) if report.posted_accounts > 0 => {
                            tracing::info!(
                                checked = report.checked,
                                posted = report.posted_accounts,
                                entries = report.entries,
                                "posting run"
                            );
                        }
                        Ok(_) => tracing::trace!("posting run: nothing due"),
                        Err(e) => tracing::warn!(error = %e, "posting run failed"),
                    }
                }
            }
        }
    }
}
