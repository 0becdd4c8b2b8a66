mod buffer_pool;
mod error;
mod heap_file;
mod lock_manager;
mod page;

pub use buffer_pool::{BufferPool, DEFAULT_LOCK_TIMEOUT, DEFAULT_PAGES};
pub use error::{StorageError, StorageResult};
pub use heap_file::{DbFile, HeapFile, TupleScan};
pub use lock_manager::{LockManager, LockMode};
pub use page::{HeapPage, Page, PageRef};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Process-wide page size used by newly opened heap files
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Acquire)
}

/// Override the page size. Intended for tests; files that are already open
/// keep the size they were opened with.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::Release);
}

/// Restore `DEFAULT_PAGE_SIZE`
pub fn reset_page_size() {
    set_page_size(DEFAULT_PAGE_SIZE);
}

/// Table identifier
pub type TableId = u64;

/// Page number within a table's file
pub type PageNo = usize;

/// Identifies a page: the table it belongs to and its position in that
/// table's file. Never shared between tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Access requested when fetching a page through the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

impl Permissions {
    pub fn lock_mode(self) -> LockMode {
        match self {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}
