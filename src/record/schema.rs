use std::fmt;

use super::error::{RecordError, RecordResult};
use super::value::{Field, FieldType};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub field_type: FieldType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, field_type: FieldType, not_null: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            not_null,
        }
    }

    /// Nullable column shorthand
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type, false)
    }
}

/// Schema of a table: an ordered list of fixed-width columns.
///
/// An encoded tuple is `[NULL bitmap][col0][col1]...`, where the bitmap has
/// one bit per column and every column occupies `FieldType::width()` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDesc {
    columns: Vec<ColumnDef>,
    null_bitmap_size: usize,
    tuple_size: usize,
}

impl TupleDesc {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let null_bitmap_size = columns.len().div_ceil(8);
        let tuple_size = null_bitmap_size
            + columns
                .iter()
                .map(|c| c.field_type.width())
                .sum::<usize>();

        Self {
            columns,
            null_bitmap_size,
            tuple_size,
        }
    }

    /// Build a schema of nullable columns from `(name, type)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, FieldType)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| ColumnDef::nullable(name, ty))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    pub fn field_type(&self, idx: usize) -> Option<FieldType> {
        self.columns.get(idx).map(|c| c.field_type)
    }

    pub fn field_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(|c| c.name.as_str())
    }

    /// Position of the column called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Size in bytes of one encoded tuple, bitmap included
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Check arity, NOT NULL constraints and value types
    pub fn validate(&self, values: &[Field]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (value, col) in values.iter().zip(&self.columns) {
            if col.not_null && value.is_null() {
                return Err(RecordError::NullConstraintViolation(col.name.clone()));
            }
            if !value.fits(&col.field_type) {
                return Err(RecordError::TypeMismatch {
                    expected: format!("{} for column '{}'", col.field_type, col.name),
                    actual: format!("{:?}", value),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}({})", c.field_type, c.name))
            .collect();
        write!(f, "{}", cols.join(", "))
    }
}
