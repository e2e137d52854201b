use crate::access::{RecordId, Tuple, TupleDesc};
use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Decoded view of one heap page.
///
/// Layout: a slot bitmap of `ceil(num_slots / 8)` bytes followed by
/// `num_slots` fixed-size tuple slots. Bit `i` of the bitmap is bit `i % 8`
/// (least significant first) of header byte `i / 8`. The bytes of an empty
/// slot are meaningless; occupancy is decided by the bitmap alone.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    desc: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    header_size: usize,
    dirtier: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Number of tuples of `tuple_size` bytes that fit on a page, counting one
    /// bitmap bit per tuple.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    pub fn header_size_for(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Decodes a page from exactly one page worth of bytes.
    pub fn from_bytes(page_id: PageId, desc: Arc<TupleDesc>, data: Vec<u8>) -> Result<Self> {
        let tuple_size = desc.byte_size();
        let num_slots = Self::slots_per_page(data.len(), tuple_size);
        if tuple_size == 0 || num_slots == 0 {
            return Err(DbError::InvalidConfig(format!(
                "page size {} cannot hold a tuple of {} bytes",
                data.len(),
                tuple_size
            )));
        }
        let header_size = Self::header_size_for(num_slots);
        debug_assert!(header_size + num_slots * tuple_size <= data.len());

        // Bits past num_slots in the last header byte must be clear
        let trailing = num_slots % 8;
        if trailing != 0 && data[header_size - 1] >> trailing != 0 {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} has bitmap bits set past slot {}", page_id, num_slots),
            )));
        }

        Ok(Self {
            page_id,
            desc,
            before_image: data.clone(),
            data,
            num_slots,
            header_size,
            dirtier: None,
        })
    }

    /// A page with every slot empty.
    pub fn empty(page_id: PageId, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        Self::from_bytes(page_id, desc, vec![0u8; page_size])
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        if slot >= self.num_slots {
            return false;
        }
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let tuple_size = self.desc.byte_size();
        let start = self.header_size + slot * tuple_size;
        start..start + tuple_size
    }

    /// Stores `tuple` in the lowest free slot and assigns its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::TupleSchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.desc().to_string(),
            });
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or(DbError::PageFull(self.page_id))?;

        let bytes = tuple.serialize()?;
        let range = self.slot_range(slot);
        self.data[range].copy_from_slice(&bytes);
        self.set_slot_used(slot, true);

        let record_id = RecordId::new(self.page_id, slot);
        tuple.set_record_id(Some(record_id));
        Ok(record_id)
    }

    /// Clears the slot referenced by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::NotMember("tuple has no record id".to_string()))?;
        if record_id.page_id != self.page_id {
            return Err(DbError::NotMember(format!(
                "record {:?} does not belong to {}",
                record_id, self.page_id
            )));
        }
        if !self.is_slot_used(record_id.slot) {
            return Err(DbError::NotMember(format!(
                "slot {} of {} is empty",
                record_id.slot, self.page_id
            )));
        }
        self.set_slot_used(record_id.slot, false);
        Ok(())
    }

    /// Decodes the tuple in `slot`, or `None` when the slot is empty.
    pub fn tuple(&self, slot: usize) -> Result<Option<Tuple>> {
        if !self.is_slot_used(slot) {
            return Ok(None);
        }
        let mut tuple = Tuple::deserialize(self.desc.clone(), &self.data[self.slot_range(slot)])?;
        tuple.set_record_id(Some(RecordId::new(self.page_id, slot)));
        Ok(Some(tuple))
    }

    /// Occupied tuples in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Tuple>> + '_ {
        (0..self.num_slots).filter_map(move |slot| self.tuple(slot).transpose())
    }

    /// The on-disk image of this page.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    /// The transaction that last dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    /// Bytes of the page as of the last commit (or as read from disk).
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    pub fn set_before_image(&mut self) {
        self.before_image.clone_from(&self.data);
    }
}
