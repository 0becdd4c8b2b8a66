use std::fmt;

use super::error::{RecordError, RecordResult};

/// Column type. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Float,
    /// Fixed-width string of up to `n` bytes, zero padded on disk. Values
    /// may not contain NUL, which marks the end of the string.
    Char(usize),
}

impl FieldType {
    /// Width in bytes of an encoded value of this type
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Float => 8,
            FieldType::Char(n) => *n,
        }
    }

    /// Parse the textual form used in schema files: `INT`, `FLOAT`,
    /// `CHAR(n)` or `VARCHAR(n)`.
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INT" | "INTEGER" => return Some(FieldType::Int),
            "FLOAT" | "DOUBLE" => return Some(FieldType::Float),
            _ => {}
        }

        let inner = upper
            .strip_prefix("VARCHAR(")
            .or_else(|| upper.strip_prefix("CHAR("))?
            .strip_suffix(')')?;
        match inner.trim().parse::<usize>() {
            Ok(n) if n > 0 => Some(FieldType::Char(n)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::Char(n) => write!(f, "CHAR({})", n),
        }
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Float(f64),
    Str(String),
    Null,
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Whether this value may be stored in a column of `field_type`.
    /// NULL fits every type; nullability is checked by the schema.
    pub fn fits(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Field::Null, _) => true,
            (Field::Int(_), FieldType::Int) => true,
            (Field::Float(_), FieldType::Float) => true,
            (Field::Str(s), FieldType::Char(n)) => s.len() <= *n && !s.contains('\0'),
            _ => false,
        }
    }

    /// Append the fixed-width encoding of this value to `out`
    pub fn encode_into(&self, field_type: &FieldType, out: &mut Vec<u8>) -> RecordResult<()> {
        match (self, field_type) {
            (Field::Int(i), FieldType::Int) => out.extend_from_slice(&i.to_le_bytes()),
            (Field::Float(x), FieldType::Float) => out.extend_from_slice(&x.to_le_bytes()),
            (Field::Str(s), FieldType::Char(width)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *width {
                    return Err(RecordError::Serialization(format!(
                        "string of {} bytes does not fit CHAR({})",
                        bytes.len(),
                        width
                    )));
                }
                if bytes.contains(&0) {
                    return Err(RecordError::Serialization(
                        "NUL byte in CHAR value".to_string(),
                    ));
                }
                out.extend_from_slice(bytes);
                out.resize(out.len() + (width - bytes.len()), 0);
            }
            (Field::Null, ty) => out.resize(out.len() + ty.width(), 0),
            (value, ty) => {
                return Err(RecordError::TypeMismatch {
                    expected: ty.to_string(),
                    actual: format!("{:?}", value),
                });
            }
        }
        Ok(())
    }

    /// Decode a value from exactly `field_type.width()` bytes
    pub fn decode(bytes: &[u8], field_type: &FieldType, is_null: bool) -> RecordResult<Self> {
        if bytes.len() != field_type.width() {
            return Err(RecordError::Deserialization(format!(
                "{} needs {} bytes, got {}",
                field_type,
                field_type.width(),
                bytes.len()
            )));
        }
        if is_null {
            return Ok(Field::Null);
        }

        let field = match field_type {
            FieldType::Int => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                Field::Int(i32::from_le_bytes(raw))
            }
            FieldType::Float => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Field::Float(f64::from_le_bytes(raw))
            }
            FieldType::Char(_) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = std::str::from_utf8(&bytes[..end])
                    .map_err(|e| RecordError::Deserialization(format!("invalid UTF-8: {}", e)))?;
                Field::Str(s.to_string())
            }
        };
        Ok(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(i) => write!(f, "{}", i),
            Field::Float(x) => write!(f, "{}", x),
            Field::Str(s) => write!(f, "{}", s),
            Field::Null => write!(f, "NULL"),
        }
    }
}
