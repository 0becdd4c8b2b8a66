use log::{debug, error, info, warn};
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::error::{StorageError, StorageResult};
use super::lock_manager::LockManager;
use super::page::PageRef;
use super::{PageId, Permissions, TableId};
use crate::catalog::Catalog;
use crate::config::DbConfig;
use crate::record::{RecordError, Tuple};
use crate::transaction::TransactionId;

/// Default number of cached pages
pub const DEFAULT_PAGES: usize = 50;

/// How long `get_page` waits for a conflicting lock before aborting
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Bounded page cache shared by every transaction.
///
/// All page access goes through `get_page`, which takes the page lock first
/// and then serves the page from the cache or from disk. Dirty pages are
/// never written before their transaction commits, so eviction only
/// considers clean pages and fails with `CannotEvict` when there are none.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    /// Least recently used entries are eviction candidates first. The cache
    /// itself is unbounded; `capacity` is enforced by `evict_page`.
    pages: Mutex<LruCache<PageId, PageRef>>,
    capacity: usize,
    lock_timeout: Duration,
}

impl BufferPool {
    /// Create a pool holding at most `num_pages` pages
    pub fn new(catalog: Arc<Catalog>, num_pages: usize) -> Self {
        Self::build(catalog, num_pages, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_config(catalog: Arc<Catalog>, config: &DbConfig) -> Self {
        Self::build(catalog, config.buffer_pool_pages, config.lock_timeout())
    }

    fn build(catalog: Arc<Catalog>, capacity: usize, lock_timeout: Duration) -> Self {
        debug!(
            "Buffer pool with {} pages, lock timeout {:?}",
            capacity, lock_timeout
        );
        Self {
            catalog,
            lock_manager: LockManager::new(),
            pages: Mutex::new(LruCache::unbounded()),
            capacity,
            lock_timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_page_count(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.pages.lock().contains(&pid)
    }

    /// Fetch page `pid` on behalf of `tid`.
    ///
    /// Blocks until the lock implied by `perm` is granted. If the lock is
    /// still unavailable after the lock timeout the call fails with
    /// `TransactionAborted`; the caller is expected to abort `tid`.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> StorageResult<PageRef> {
        if !self
            .lock_manager
            .acquire_lock_timeout(pid, tid, perm.lock_mode(), self.lock_timeout)
        {
            return Err(StorageError::TransactionAborted(tid));
        }

        let mut pages = self.pages.lock();
        if let Some(page) = pages.get(&pid) {
            return Ok(Arc::clone(page));
        }

        if pages.len() >= self.capacity {
            self.evict_page(&mut pages)?;
        }

        let file = self.catalog.database_file(pid.table_id)?;
        let page = file.read_page(pid)?;
        pages.put(pid, Arc::clone(&page));
        debug!("Loaded page {} for {}", pid, tid);
        Ok(page)
    }

    /// Release `tid`'s lock on `pid` before the transaction ends. Breaks
    /// two-phase locking; only safe for pages the transaction did not use.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release_lock(pid, tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(pid, tid)
    }

    /// Finish `tid`. On commit its dirty pages are written and synced; on
    /// abort they are replaced in the cache by their on-disk image. Either
    /// way every lock `tid` holds is released, even if a write failed.
    ///
    /// Pages left dirty by a failed commit or revert are dropped from the
    /// cache before the locks go, so no other transaction can see them.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let dirty = self.pages_dirtied_by(tid);
        let result = if commit {
            self.commit_pages(&dirty)
        } else {
            self.revert_pages(&dirty)
        };

        if result.is_err() {
            for (pid, _) in self.pages_dirtied_by(tid) {
                self.discard_page(pid);
                error!("Dropped page {} left dirty by {}", pid, tid);
            }
        }

        let released = self.lock_manager.release_all(tid);
        match &result {
            Ok(()) => info!(
                "{} {} ({} dirty pages, {} locks released)",
                tid,
                if commit { "committed" } else { "aborted" },
                dirty.len(),
                released
            ),
            Err(err) => warn!("Completing {} failed: {}", tid, err),
        }
        result
    }

    fn commit_pages(&self, dirty: &[(PageId, PageRef)]) -> StorageResult<()> {
        let mut tables: Vec<TableId> = Vec::new();
        for (pid, page) in dirty {
            self.write_back(*pid, page)?;
            if !tables.contains(&pid.table_id) {
                tables.push(pid.table_id);
            }
        }
        for table_id in tables {
            self.catalog.database_file(table_id)?.sync()?;
        }
        Ok(())
    }

    fn revert_pages(&self, dirty: &[(PageId, PageRef)]) -> StorageResult<()> {
        for (pid, _) in dirty {
            let file = self.catalog.database_file(pid.table_id)?;
            let fresh = file.read_page(*pid)?;
            if let Some(slot) = self.pages.lock().peek_mut(pid) {
                *slot = fresh;
            }
            debug!("Reverted page {}", pid);
        }
        Ok(())
    }

    /// Add `tuple` to `table_id` for `tid`. The pages the file modified are
    /// marked dirty and kept in the cache.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> StorageResult<()> {
        let file = self.catalog.database_file(table_id)?;
        let modified = file.insert_tuple(self, tid, tuple)?;
        self.install_dirty(tid, modified)
    }

    /// Remove `tuple` from the table named by its record id
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        let file = self.catalog.database_file(rid.page_id.table_id)?;
        let modified = file.delete_tuple(self, tid, tuple)?;
        self.install_dirty(tid, modified)
    }

    /// Re-admit pages the file modified. They are already dirtied by `tid`,
    /// so eviction cannot pick them once they are back in the cache.
    fn install_dirty(&self, tid: TransactionId, modified: Vec<PageRef>) -> StorageResult<()> {
        for page in modified {
            let pid = {
                let guard = page.read();
                debug_assert_eq!(guard.dirtied_by(), Some(tid));
                guard.id()
            };

            let mut pages = self.pages.lock();
            if !pages.contains(&pid) && pages.len() >= self.capacity {
                self.evict_page(&mut pages)?;
            }
            pages.put(pid, page);
        }
        Ok(())
    }

    /// Write every dirty cached page to disk, whoever dirtied it. Keeps
    /// going past failures and reports the first one.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let snapshot: Vec<(PageId, PageRef)> = self
            .pages
            .lock()
            .iter()
            .map(|(pid, page)| (*pid, Arc::clone(page)))
            .collect();

        let mut first_error = None;
        for (pid, page) in snapshot {
            if let Err(err) = self.write_back(pid, &page) {
                error!("Failed to flush page {}: {}", pid, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drop `pid` from the cache without writing it
    pub fn discard_page(&self, pid: PageId) {
        self.pages.lock().pop(&pid);
    }

    /// Write `pid` to disk if it is cached and dirty
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let page = self.pages.lock().peek(&pid).cloned();
        match page {
            Some(page) => self.write_back(pid, &page),
            None => Ok(()),
        }
    }

    /// Write every page `tid` dirtied
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        for (pid, page) in self.pages_dirtied_by(tid) {
            self.write_back(pid, &page)?;
        }
        Ok(())
    }

    pub fn dirty_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pids: Vec<PageId> = self
            .pages_dirtied_by(tid)
            .into_iter()
            .map(|(pid, _)| pid)
            .collect();
        pids.sort();
        pids
    }

    fn pages_dirtied_by(&self, tid: TransactionId) -> Vec<(PageId, PageRef)> {
        self.pages
            .lock()
            .iter()
            .filter(|(_, page)| page.read().dirtied_by() == Some(tid))
            .map(|(pid, page)| (*pid, Arc::clone(page)))
            .collect()
    }

    /// Write a dirty page out and mark it clean
    fn write_back(&self, pid: PageId, page: &PageRef) -> StorageResult<()> {
        let mut guard = page.write();
        if guard.dirtied_by().is_none() {
            return Ok(());
        }
        let file = self.catalog.database_file(pid.table_id)?;
        file.write_page(&*guard)?;
        guard.mark_clean();
        debug!("Flushed page {}", pid);
        Ok(())
    }

    /// Drop the least recently used clean page. Pages someone is modifying
    /// right now are skipped.
    fn evict_page(&self, pages: &mut LruCache<PageId, PageRef>) -> StorageResult<()> {
        let victim = pages
            .iter()
            .rev()
            .find(|(_, page)| {
                page.try_read()
                    .is_some_and(|guard| guard.dirtied_by().is_none())
            })
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                pages.pop(&pid);
                debug!("Evicted page {}", pid);
                Ok(())
            }
            None => {
                error!("No clean page to evict among {} cached", pages.len());
                Err(StorageError::CannotEvict)
            }
        }
    }
}
