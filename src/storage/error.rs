use std::io;
use thiserror::Error;

use super::{PageId, PageNo, TableId};
use crate::catalog::CatalogError;
use crate::record::RecordError;
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Transaction {0} aborted: lock wait timed out")]
    TransactionAborted(TransactionId),

    #[error("Cannot evict: every cached page is dirty")]
    CannotEvict,

    #[error("Page {page} out of range: file has {num_pages} pages")]
    PageOutOfRange { page: PageId, num_pages: PageNo },

    #[error("Short read of page {page}: expected {expected} bytes, got {actual}")]
    ShortRead {
        page: PageId,
        expected: usize,
        actual: usize,
    },

    #[error("Page {page} does not belong to table {table}")]
    WrongTable { page: PageId, table: TableId },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),
}

impl StorageError {
    /// Lock timeouts are the only error a caller is expected to recover
    /// from, by aborting and retrying the transaction.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, StorageError::TransactionAborted(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
