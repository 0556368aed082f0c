//! Keyed lock table.
//!
//! Operations on the same key (a submission, an account, an order) are
//! serialized; operations on different keys run concurrently. An entry
//! lives only while some caller holds or waits for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A table of per-key mutexes created on demand.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for `key`.
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the table entry for `key` if `lock` is the last outside handle.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(key)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
        if idle {
            locks.remove(key);
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.lock_for(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(key, lock);
        result
    }

    /// Run `f` while holding the locks for every key.
    ///
    /// Keys are deduplicated and acquired in sorted order, so two callers
    /// locking overlapping sets cannot deadlock.
    pub fn with_locks<R>(&self, keys: &[&str], f: impl FnOnce() -> R) -> R {
        let mut sorted: Vec<&str> = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let locks: Vec<Arc<Mutex<()>>> = sorted.iter().map(|k| self.lock_for(k)).collect();
        let result = {
            let _guards: Vec<MutexGuard<'_, ()>> = locks
                .iter()
                .map(|l| l.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };
        for (key, lock) in sorted.into_iter().zip(locks) {
            self.release(key, lock);
        }
        result
    }

    /// Number of keys with a lock entry.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
