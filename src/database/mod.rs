use log::info;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::config::{ConfigError, DbConfig};
use crate::record::TupleDesc;
use crate::storage::{self, BufferPool, HeapFile, StorageError, TableId};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Ties the catalog, the buffer pool and the configuration together.
///
/// Components that need page access take `buffer_pool()`; there is no
/// process-global database instance.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
}

impl Database {
    /// Validate `config`, apply its page size process-wide and start with an
    /// empty catalog
    pub fn new(config: DbConfig) -> DatabaseResult<Self> {
        config.validate()?;
        storage::set_page_size(config.page_size);

        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::with_config(Arc::clone(&catalog), &config);
        info!(
            "Database ready: page size {}, {} buffer pages",
            config.page_size, config.buffer_pool_pages
        );

        Ok(Self {
            config,
            catalog,
            buffer_pool,
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        desc: TupleDesc,
    ) -> DatabaseResult<TableId> {
        let file = HeapFile::with_page_size(path, desc, self.config.page_size)?;
        Ok(self.catalog.add_table(Arc::new(file), name, None)?)
    }

    /// Register every table in a JSON schema file
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> DatabaseResult<Vec<TableId>> {
        Ok(self.catalog.load_schema(path)?)
    }

    /// Replace the buffer pool with an empty one of `num_pages` over the same
    /// catalog. Cached pages and held locks are dropped without flushing.
    pub fn reset_buffer_pool(&mut self, num_pages: usize) {
        self.config.buffer_pool_pages = num_pages;
        self.buffer_pool = BufferPool::with_config(Arc::clone(&self.catalog), &self.config);
    }
}

#[cfg(test)]
mod tests;
