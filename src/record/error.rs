use crate::storage::PageId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("NULL value for NOT NULL column: {0}")]
    NullConstraintViolation(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid slot: page={0}, slot={1}")]
    InvalidSlot(PageId, usize),

    #[error("Page full: page={0}")]
    PageFull(PageId),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Tuple not found on page {page}: {reason}")]
    TupleNotFound { page: PageId, reason: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
