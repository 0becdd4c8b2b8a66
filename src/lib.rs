pub mod catalog;
pub mod config;
pub mod database;
pub mod logger;
pub mod record;
pub mod storage;
pub mod transaction;

pub use catalog::{Catalog, CatalogError, CatalogResult};
pub use config::{ConfigError, DbConfig};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use record::{
    ColumnDef, Field, FieldType, RecordError, RecordId, RecordResult, Tuple, TupleDesc,
};
pub use storage::{
    BufferPool, DbFile, HeapFile, HeapPage, LockManager, LockMode, Page, PageId, PageRef,
    Permissions, StorageError, StorageResult, TableId,
};
pub use transaction::TransactionId;
