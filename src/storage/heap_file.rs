use log::debug;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::buffer_pool::BufferPool;
use super::error::{StorageError, StorageResult};
use super::page::{HeapPage, Page, PageRef};
use super::{PageId, PageNo, Permissions, TableId, page_size};
use crate::record::{RecordError, Tuple, TupleDesc};
use crate::transaction::TransactionId;

/// A table's backing store, addressed uniformly by table id.
///
/// Tuple-level operations take the buffer pool explicitly: every page they
/// touch is fetched through it, so locking and caching stay in one place.
pub trait DbFile: fmt::Debug + Send + Sync {
    fn id(&self) -> TableId;

    fn path(&self) -> &Path;

    fn tuple_desc(&self) -> &Arc<TupleDesc>;

    fn page_size(&self) -> usize;

    /// Read page `pid` straight from disk
    fn read_page(&self, pid: PageId) -> StorageResult<PageRef>;

    /// Overwrite the page's byte range on disk. Never changes the file length.
    fn write_page(&self, page: &dyn Page) -> StorageResult<()>;

    fn num_pages(&self) -> StorageResult<PageNo>;

    /// Flush OS buffers for this file
    fn sync(&self) -> StorageResult<()>;

    /// Place `tuple` on a page and return the pages that were modified.
    /// Modified pages are marked dirtied by `tid` before their write guard
    /// is released, so eviction never sees them clean.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> StorageResult<Vec<PageRef>>;

    /// Remove `tuple` from the page its record id names and return the pages
    /// that were modified
    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef>>;

    /// Scan every tuple in page order, reading through `pool`
    fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> TupleScan<'a>;
}

/// Unordered collection of tuples stored in fixed-size `HeapPage`s.
///
/// Pages are numbered contiguously from 0 and the page count is
/// `file length / page size`; new pages are only ever appended.
pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    table_id: TableId,
    desc: Arc<TupleDesc>,
    page_size: usize,
}

impl HeapFile {
    /// Create a new, empty heap file. Fails if `path` exists.
    pub fn create<P: AsRef<Path>>(path: P, desc: TupleDesc) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StorageError::FileAlreadyExists(path.display().to_string()));
        }
        Self::open(path, desc)
    }

    /// Open the heap file at `path`, creating it (and its parent directories)
    /// when missing. Uses the current process-wide page size.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> StorageResult<Self> {
        Self::with_page_size(path, desc, page_size())
    }

    pub fn with_page_size<P: AsRef<Path>>(
        path: P,
        desc: TupleDesc,
        page_size: usize,
    ) -> StorageResult<Self> {
        let path = path.as_ref();
        if HeapPage::slots_per_page(page_size, desc.tuple_size()) == 0 {
            return Err(RecordError::Serialization(format!(
                "tuple of {} bytes does not fit a {} byte page",
                desc.tuple_size(),
                page_size
            ))
            .into());
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let path = path.canonicalize()?;

        let table_id = Self::table_id_for(&path);
        debug!("Opened heap file {} as table {}", path.display(), table_id);

        Ok(Self {
            path,
            file: Mutex::new(file),
            table_id,
            desc: Arc::new(desc),
            page_size,
        })
    }

    /// Table ids are a hash of the canonical path, so reopening the same
    /// file yields the same id
    fn table_id_for(path: &Path) -> TableId {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    fn page_count(&self, file: &File) -> StorageResult<PageNo> {
        let len = file.metadata()?.len();
        Ok((len / self.page_size as u64) as PageNo)
    }

    fn check_table(&self, pid: PageId) -> StorageResult<()> {
        if pid.table_id != self.table_id {
            return Err(StorageError::WrongTable {
                page: pid,
                table: self.table_id,
            });
        }
        Ok(())
    }

    fn offset(&self, page_no: PageNo) -> u64 {
        (page_no * self.page_size) as u64
    }

    /// Append one freshly initialized page, growing the file by exactly one
    /// page size
    fn append_empty_page(&self) -> StorageResult<PageId> {
        let mut file = self.file.lock();
        let page_no = self.page_count(&file)?;

        file.seek(SeekFrom::Start(self.offset(page_no)))?;
        file.write_all(&HeapPage::empty_page_data(self.page_size))?;

        debug!("Table {} grew to {} pages", self.table_id, page_no + 1);
        Ok(PageId::new(self.table_id, page_no))
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.table_id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, pid: PageId) -> StorageResult<PageRef> {
        self.check_table(pid)?;

        let mut buffer = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            let num_pages = self.page_count(&file)?;
            if pid.page_no >= num_pages {
                return Err(StorageError::PageOutOfRange {
                    page: pid,
                    num_pages,
                });
            }

            file.seek(SeekFrom::Start(self.offset(pid.page_no)))?;
            let mut filled = 0;
            while filled < buffer.len() {
                match file.read(&mut buffer[filled..])? {
                    0 => break,
                    n => filled += n,
                }
            }
            if filled < self.page_size {
                return Err(StorageError::ShortRead {
                    page: pid,
                    expected: self.page_size,
                    actual: filled,
                });
            }
        }

        let page = HeapPage::from_bytes(pid, &buffer, Arc::clone(&self.desc))?;
        Ok(Arc::new(RwLock::new(page)))
    }

    fn write_page(&self, page: &dyn Page) -> StorageResult<()> {
        let pid = page.id();
        self.check_table(pid)?;

        let data = page.page_data()?;
        if data.len() != self.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.page_size,
                actual: data.len(),
            });
        }

        let mut file = self.file.lock();
        let num_pages = self.page_count(&file)?;
        if pid.page_no >= num_pages {
            return Err(StorageError::PageOutOfRange {
                page: pid,
                num_pages,
            });
        }

        file.seek(SeekFrom::Start(self.offset(pid.page_no)))?;
        file.write_all(&data)?;
        Ok(())
    }

    fn num_pages(&self) -> StorageResult<PageNo> {
        let file = self.file.lock();
        self.page_count(&file)
    }

    fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        self.desc.validate(tuple.fields())?;

        // first fit over existing pages
        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            if page.read().num_empty_slots() == 0 {
                continue;
            }
            {
                let mut guard = page.write();
                guard.insert_tuple(tuple)?;
                guard.mark_dirty(tid);
            }
            return Ok(vec![page]);
        }

        let pid = self.append_empty_page()?;
        let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.insert_tuple(tuple)?;
            guard.mark_dirty(tid);
        }
        Ok(vec![page])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        self.check_table(rid.page_id)?;

        let num_pages = self.num_pages()?;
        if rid.page_id.page_no >= num_pages {
            return Err(StorageError::PageOutOfRange {
                page: rid.page_id,
                num_pages,
            });
        }

        let page = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(tuple)?;
            guard.mark_dirty(tid);
        }
        Ok(vec![page])
    }

    fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> TupleScan<'a> {
        TupleScan::new(self, pool, tid)
    }
}

impl fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("table_id", &self.table_id)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Streaming scan over a table, one page at a time. Pages are fetched
/// `ReadOnly` through the buffer pool on behalf of `tid`.
pub struct TupleScan<'a> {
    file: &'a dyn DbFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: PageNo,
    current: std::vec::IntoIter<Tuple>,
    done: bool,
}

impl<'a> TupleScan<'a> {
    pub fn new(file: &'a dyn DbFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            current: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Restart from the first page
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
        self.done = false;
    }
}

impl Iterator for TupleScan<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok(tuple));
            }
            if self.done {
                return None;
            }

            let num_pages = match self.file.num_pages() {
                Ok(n) => n,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if self.next_page >= num_pages {
                self.done = true;
                return None;
            }

            let pid = PageId::new(self.file.id(), self.next_page);
            self.next_page += 1;
            match self.pool.get_page(self.tid, pid, Permissions::ReadOnly) {
                Ok(page) => self.current = page.read().tuples().into_iter(),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
