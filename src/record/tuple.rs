use std::fmt;

use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::value::Field;
use crate::storage::PageId;

/// Slot index within a page
pub type SlotId = usize;

/// Physical location of a stored tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// A row. Carries the `RecordId` of the slot it was read from or inserted
/// into, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn set_field(&mut self, idx: usize, value: Field) {
        if let Some(slot) = self.fields.get_mut(idx) {
            *slot = value;
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Encode to exactly `desc.tuple_size()` bytes
    pub fn encode(&self, desc: &TupleDesc) -> RecordResult<Vec<u8>> {
        desc.validate(&self.fields)?;

        let mut out = vec![0u8; desc.null_bitmap_size()];
        for (i, value) in self.fields.iter().enumerate() {
            if value.is_null() {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        out.reserve(desc.tuple_size() - out.len());

        for (value, col) in self.fields.iter().zip(desc.columns()) {
            value.encode_into(&col.field_type, &mut out)?;
        }
        Ok(out)
    }

    /// Decode a tuple from exactly `desc.tuple_size()` bytes
    pub fn decode(bytes: &[u8], desc: &TupleDesc) -> RecordResult<Self> {
        if bytes.len() != desc.tuple_size() {
            return Err(RecordError::Deserialization(format!(
                "tuple needs {} bytes, got {}",
                desc.tuple_size(),
                bytes.len()
            )));
        }

        let (bitmap, mut rest) = bytes.split_at(desc.null_bitmap_size());
        let mut fields = Vec::with_capacity(desc.num_fields());
        for (i, col) in desc.columns().iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            let (raw, tail) = rest.split_at(col.field_type.width());
            fields.push(Field::decode(raw, &col.field_type, is_null)?);
            rest = tail;
        }

        Ok(Self::new(fields))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", cols.join("\t"))
    }
}
