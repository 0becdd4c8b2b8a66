use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use super::PageId;
use crate::record::{RecordError, RecordId, RecordResult, SlotId, Tuple, TupleDesc};
use crate::transaction::TransactionId;

/// Shared handle to a cached page. Handed out by the buffer pool and mutated
/// in place by the holder of the page's lock.
pub type PageRef = Arc<RwLock<dyn Page>>;

/// A fixed-size unit of table storage.
///
/// Implementations must serialize idempotently: decoding the bytes returned
/// by `page_data` reproduces the same set of tuples.
pub trait Page: fmt::Debug + Send + Sync {
    fn id(&self) -> PageId;

    /// Transaction that last modified this page since it was loaded or flushed
    fn dirtied_by(&self) -> Option<TransactionId>;

    fn mark_dirty(&mut self, tid: TransactionId);

    fn mark_clean(&mut self);

    /// On-disk image of the page
    fn page_data(&self) -> RecordResult<Vec<u8>>;

    fn num_empty_slots(&self) -> usize;

    /// Store `tuple` in a free slot and return where it landed
    fn insert_tuple(&mut self, tuple: Tuple) -> RecordResult<RecordId>;

    /// Remove the tuple stored at `tuple.record_id()`
    fn delete_tuple(&mut self, tuple: &Tuple) -> RecordResult<()>;

    /// Stored tuples in slot order, each stamped with its record id
    fn tuples(&self) -> Vec<Tuple>;
}

/// Slotted heap page.
///
/// Layout: a header bitmap with one bit per slot (bit `i % 8` of byte `i / 8`
/// is set when slot `i` is used), followed by `num_slots` fixed-width tuple
/// slots, followed by zero padding up to the page size.
pub struct HeapPage {
    id: PageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuples of `tuple_size` bytes that fit on a page, counting
    /// one header bit per tuple
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        if tuple_size == 0 {
            return 0;
        }
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    /// Header bitmap size in bytes for `num_slots` slots
    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Bytes of a freshly initialized page with every slot free
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// An empty in-memory page
    pub fn empty(id: PageId, desc: Arc<TupleDesc>, page_size: usize) -> RecordResult<Self> {
        Self::from_bytes(id, &Self::empty_page_data(page_size), desc)
    }

    /// Decode a page image. The page size is the length of `data`.
    pub fn from_bytes(id: PageId, data: &[u8], desc: Arc<TupleDesc>) -> RecordResult<Self> {
        let page_size = data.len();
        let tuple_size = desc.tuple_size();
        let num_slots = Self::slots_per_page(page_size, tuple_size);
        if num_slots == 0 {
            return Err(RecordError::Deserialization(format!(
                "tuple of {} bytes does not fit a {} byte page",
                tuple_size, page_size
            )));
        }

        let header_size = Self::header_size(num_slots);
        let header = data[..header_size].to_vec();

        let mut page = Self {
            id,
            desc,
            page_size,
            header,
            slots: Vec::with_capacity(num_slots),
            dirtied_by: None,
        };

        for slot in 0..num_slots {
            if !page.is_slot_used(slot) {
                page.slots.push(None);
                continue;
            }
            let start = header_size + slot * tuple_size;
            let mut tuple = Tuple::decode(&data[start..start + tuple_size], &page.desc)?;
            tuple.set_record_id(Some(RecordId::new(id, slot)));
            page.slots.push(Some(tuple));
        }

        Ok(page)
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        self.header
            .get(slot / 8)
            .is_some_and(|byte| byte & (1 << (slot % 8)) != 0)
    }

    fn set_slot_used(&mut self, slot: SlotId, used: bool) {
        let mask = 1 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    fn first_free_slot(&self) -> Option<SlotId> {
        (0..self.num_slots()).find(|&slot| !self.is_slot_used(slot))
    }

    fn tuple_not_found(&self, reason: impl Into<String>) -> RecordError {
        RecordError::TupleNotFound {
            page: self.id,
            reason: reason.into(),
        }
    }
}

impl Page for HeapPage {
    fn id(&self) -> PageId {
        self.id
    }

    fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirtied_by = Some(tid);
    }

    fn mark_clean(&mut self) {
        self.dirtied_by = None;
    }

    fn page_data(&self) -> RecordResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.page_size);
        out.extend_from_slice(&self.header);

        let tuple_size = self.desc.tuple_size();
        for slot in &self.slots {
            match slot {
                Some(tuple) => out.extend_from_slice(&tuple.encode(&self.desc)?),
                None => out.resize(out.len() + tuple_size, 0),
            }
        }

        out.resize(self.page_size, 0);
        Ok(out)
    }

    fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    fn insert_tuple(&mut self, mut tuple: Tuple) -> RecordResult<RecordId> {
        self.desc.validate(tuple.fields())?;

        let slot = self.first_free_slot().ok_or(RecordError::PageFull(self.id))?;
        let rid = RecordId::new(self.id, slot);
        tuple.set_record_id(Some(rid));

        self.set_slot_used(slot, true);
        self.slots[slot] = Some(tuple);
        Ok(rid)
    }

    fn delete_tuple(&mut self, tuple: &Tuple) -> RecordResult<()> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        if rid.page_id != self.id {
            return Err(self.tuple_not_found(format!("record id points at page {}", rid.page_id)));
        }
        if rid.slot >= self.num_slots() {
            return Err(RecordError::InvalidSlot(self.id, rid.slot));
        }
        if !self.is_slot_used(rid.slot) {
            return Err(self.tuple_not_found(format!("slot {} is empty", rid.slot)));
        }

        // compare encoded images so floats match bit for bit, NaN included
        let stored_matches = match (&self.slots[rid.slot], tuple.encode(&self.desc)) {
            (Some(stored), Ok(wanted)) => stored.encode(&self.desc)? == wanted,
            _ => false,
        };
        if !stored_matches {
            return Err(self.tuple_not_found(format!("slot {} holds a different tuple", rid.slot)));
        }

        self.set_slot_used(rid.slot, false);
        self.slots[rid.slot] = None;
        Ok(())
    }

    fn tuples(&self) -> Vec<Tuple> {
        self.slots.iter().flatten().cloned().collect()
    }
}

impl fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPage")
            .field("id", &self.id)
            .field("num_slots", &self.num_slots())
            .field("empty_slots", &self.num_empty_slots())
            .field("dirtied_by", &self.dirtied_by)
            .finish()
    }
}
