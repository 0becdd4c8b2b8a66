use ahash::AHashMap;
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::record::{ColumnDef, FieldType, TupleDesc};
use crate::storage::{DbFile, HeapFile, StorageResult, TableId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} not found")]
    TableNameNotFound(String),

    #[error("Column {0} not found")]
    ColumnNotFound(String),

    #[error("Invalid type '{column_type}' for column {column}")]
    InvalidColumnType { column: String, column_type: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String, // "INT", "FLOAT", "CHAR(n)" or "VARCHAR(n)"
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnMetadata {
    pub fn to_column_def(&self) -> CatalogResult<ColumnDef> {
        let field_type =
            FieldType::parse(&self.column_type).ok_or_else(|| CatalogError::InvalidColumnType {
                column: self.name.clone(),
                column_type: self.column_type.clone(),
            })?;
        Ok(ColumnDef::new(self.name.clone(), field_type, self.not_null))
    }
}

impl From<&ColumnDef> for ColumnMetadata {
    fn from(col: &ColumnDef) -> Self {
        Self {
            name: col.name.clone(),
            column_type: col.field_type.to_string(),
            not_null: col.not_null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// Backing file; relative paths resolve against the schema file's directory
    pub file: PathBuf,
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

impl TableMetadata {
    pub fn tuple_desc(&self) -> CatalogResult<TupleDesc> {
        let columns = self
            .columns
            .iter()
            .map(ColumnMetadata::to_column_def)
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(TupleDesc::new(columns))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableMetadata>,
}

struct TableEntry {
    name: String,
    file: Arc<dyn DbFile>,
    primary_key: Option<String>,
}

#[derive(Default)]
struct Tables {
    by_id: AHashMap<TableId, TableEntry>,
    by_name: AHashMap<String, TableId>,
}

/// Directory of the tables in the database, keyed by table id and by name
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` as table `name`. An existing table with the same name
    /// or the same id is replaced.
    pub fn add_table(
        &self,
        file: Arc<dyn DbFile>,
        name: &str,
        primary_key: Option<&str>,
    ) -> CatalogResult<TableId> {
        if let Some(pk) = primary_key
            && file.tuple_desc().index_of(pk).is_none()
        {
            return Err(CatalogError::ColumnNotFound(pk.to_string()));
        }

        let table_id = file.id();
        let mut tables = self.tables.write();

        if let Some(old_id) = tables.by_name.remove(name) {
            tables.by_id.remove(&old_id);
        }
        if let Some(old) = tables.by_id.remove(&table_id) {
            tables.by_name.remove(&old.name);
        }

        tables.by_name.insert(name.to_string(), table_id);
        tables.by_id.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file,
                primary_key: primary_key.map(str::to_string),
            },
        );
        debug!("Registered table {} as id {}", name, table_id);
        Ok(table_id)
    }

    /// File backing table `table_id`
    pub fn database_file(&self, table_id: TableId) -> CatalogResult<Arc<dyn DbFile>> {
        self.tables
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(CatalogError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> CatalogResult<Arc<TupleDesc>> {
        Ok(Arc::clone(self.database_file(table_id)?.tuple_desc()))
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNameNotFound(name.to_string()))
    }

    pub fn table_name(&self, table_id: TableId) -> CatalogResult<String> {
        self.tables
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or(CatalogError::TableNotFound(table_id))
    }

    pub fn primary_key(&self, table_id: TableId) -> CatalogResult<Option<String>> {
        self.tables
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| entry.primary_key.clone())
            .ok_or(CatalogError::TableNotFound(table_id))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().by_id.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register every table described by the JSON schema file at `path`,
    /// opening (or creating) its heap file. Returns the new table ids in
    /// file order.
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> StorageResult<Vec<TableId>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(CatalogError::from)?;
        let schema: SchemaMetadata = serde_json::from_str(&content).map_err(CatalogError::from)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut ids = Vec::with_capacity(schema.tables.len());
        for table in &schema.tables {
            let desc = table.tuple_desc()?;
            let file_path = if table.file.is_absolute() {
                table.file.clone()
            } else {
                base_dir.join(&table.file)
            };

            let file = HeapFile::open(&file_path, desc)?;
            ids.push(self.add_table(Arc::new(file), &table.name, table.primary_key.as_deref())?);
        }

        info!("Loaded {} tables from {}", ids.len(), path.display());
        Ok(ids)
    }

    /// Describe every registered table, sorted by name
    pub fn schema_metadata(&self) -> SchemaMetadata {
        let tables = self.tables.read();
        let mut out: Vec<TableMetadata> = tables
            .by_id
            .values()
            .map(|entry| TableMetadata {
                name: entry.name.clone(),
                file: entry.file.path().to_path_buf(),
                columns: entry
                    .file
                    .tuple_desc()
                    .columns()
                    .iter()
                    .map(ColumnMetadata::from)
                    .collect(),
                primary_key: entry.primary_key.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        SchemaMetadata { tables: out }
    }

    /// Write `schema_metadata()` to `path` as pretty JSON
    pub fn save_schema<P: AsRef<Path>>(&self, path: P) -> CatalogResult<()> {
        let content = serde_json::to_string_pretty(&self.schema_metadata())?;
        fs::write(path, content)?;
        Ok(())
    }
}
