//! Page-granularity shared/exclusive locks.
//!
//! Every call is atomic with respect to every other call: the whole lock
//! table sits behind one mutex. Waiters sleep on a condition variable that
//! is signalled whenever a lock is released, and give up at a deadline.
//! There is no wait-for graph; deadlocks are broken by the caller's timeout.

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::PageId;
use crate::transaction::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeldLock {
    tid: TransactionId,
    mode: LockMode,
}

/// Lock table. A page with no entry is unlocked; an entry holds either any
/// number of shared locks or exactly one exclusive lock, at most one per
/// transaction.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<AHashMap<PageId, Vec<HeldLock>>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try once to lock `pid` for `tid` in `mode`. Never blocks.
    ///
    /// A transaction already holding the page gets shared requests for free,
    /// and is upgraded in place to exclusive only when it is the sole holder.
    pub fn acquire_lock(&self, pid: PageId, tid: TransactionId, mode: LockMode) -> bool {
        let mut table = self.table.lock();
        Self::try_grant(&mut table, pid, tid, mode)
    }

    /// Like `acquire_lock`, but wait up to `timeout` for conflicting holders
    /// to release. Returns false if the lock is still unavailable at the
    /// deadline. No FIFO ordering is promised between waiters.
    pub fn acquire_lock_timeout(
        &self,
        pid: PageId,
        tid: TransactionId,
        mode: LockMode,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();

        loop {
            if Self::try_grant(&mut table, pid, tid, mode) {
                return true;
            }
            if self.released.wait_until(&mut table, deadline).timed_out() {
                let granted = Self::try_grant(&mut table, pid, tid, mode);
                if !granted {
                    warn!(
                        "{} timed out after {:?} waiting for {:?} lock on page {}",
                        tid, timeout, mode, pid
                    );
                }
                return granted;
            }
        }
    }

    fn try_grant(
        table: &mut AHashMap<PageId, Vec<HeldLock>>,
        pid: PageId,
        tid: TransactionId,
        mode: LockMode,
    ) -> bool {
        let Some(holders) = table.get_mut(&pid) else {
            table.insert(pid, vec![HeldLock { tid, mode }]);
            debug!("{} granted {:?} on unlocked page {}", tid, mode, pid);
            return true;
        };

        if let Some(pos) = holders.iter().position(|held| held.tid == tid) {
            return match (mode, holders[pos].mode) {
                (LockMode::Shared, _) | (LockMode::Exclusive, LockMode::Exclusive) => true,
                (LockMode::Exclusive, LockMode::Shared) if holders.len() == 1 => {
                    holders[pos].mode = LockMode::Exclusive;
                    debug!("{} upgraded to Exclusive on page {}", tid, pid);
                    true
                }
                _ => {
                    debug!(
                        "{} denied upgrade on page {}: {} other readers",
                        tid,
                        pid,
                        holders.len() - 1
                    );
                    false
                }
            };
        }

        if mode == LockMode::Shared && holders.iter().all(|held| held.mode == LockMode::Shared) {
            holders.push(HeldLock { tid, mode });
            return true;
        }

        false
    }

    /// Drop `tid`'s lock on `pid`. Returns whether a lock was held.
    pub fn release_lock(&self, pid: PageId, tid: TransactionId) -> bool {
        let mut table = self.table.lock();

        let Some(holders) = table.get_mut(&pid) else {
            return false;
        };
        let before = holders.len();
        holders.retain(|held| held.tid != tid);
        let removed = holders.len() != before;
        if holders.is_empty() {
            table.remove(&pid);
        }
        drop(table);

        if removed {
            self.released.notify_all();
        }
        removed
    }

    /// Drop every lock `tid` holds. Returns how many were released.
    pub fn release_all(&self, tid: TransactionId) -> usize {
        let mut table = self.table.lock();
        let mut released = 0;
        table.retain(|_, holders| {
            let before = holders.len();
            holders.retain(|held| held.tid != tid);
            released += before - holders.len();
            !holders.is_empty()
        });
        drop(table);

        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    pub fn holds_lock(&self, pid: PageId, tid: TransactionId) -> bool {
        self.lock_mode(pid, tid).is_some()
    }

    /// Mode of the lock `tid` holds on `pid`, if any
    pub fn lock_mode(&self, pid: PageId, tid: TransactionId) -> Option<LockMode> {
        self.table
            .lock()
            .get(&pid)?
            .iter()
            .find(|held| held.tid == tid)
            .map(|held| held.mode)
    }

    /// Pages on which `tid` holds a lock
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .iter()
            .filter(|(_, holders)| holders.iter().any(|held| held.tid == tid))
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Number of transactions holding a lock on `pid`
    pub fn holder_count(&self, pid: PageId) -> usize {
        self.table.lock().get(&pid).map_or(0, Vec::len)
    }
}
