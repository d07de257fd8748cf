use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::common::{DbError, PageId, RecordId, Result, SlotId, TransactionId};
use crate::tuple::{Schema, Tuple};

/// Heap page layout:
///
/// ```text
/// +----------------------+
/// | Header bitmap        |  ceil(num_slots / 8) bytes, 1 bit per slot
/// +----------------------+
/// | [slot 0]             |  schema.tuple_size() bytes each
/// | [slot 1]             |
/// | ...                  |
/// | [slot num_slots - 1] |
/// +----------------------+
/// | zero padding         |  up to page_size
/// +----------------------+
/// ```
///
/// Bit `i % 8` of header byte `i / 8` is set when slot `i` is occupied
/// (slot 0 is the least significant bit of the first byte). Free slots are
/// zero-filled on disk.
///
/// `num_slots = floor(8 * page_size / (8 * tuple_size + 1))`: each tuple costs
/// its own bytes plus one header bit.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    /// Occupancy bitmap, exactly as stored on disk
    header: Vec<u8>,
    /// Decoded tuples; `Some` exactly where the header bit is set
    slots: Vec<Option<Tuple>>,
    /// Maintained count of free slots
    num_empty: usize,
    dirty: bool,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Largest slot count whose slot numbers fit in a [`SlotId`].
    pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

    /// Returns how many tuples of `tuple_size` bytes fit on one page.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    /// Returns the slot count of the layout, or
    /// [`DbError::UnsupportedPageLayout`] if no tuple fits or slot numbers
    /// would overflow a [`SlotId`].
    pub fn check_layout(page_size: usize, tuple_size: usize) -> Result<usize> {
        let slots = Self::slots_per_page(page_size, tuple_size);
        if slots == 0 || slots > Self::MAX_SLOTS {
            return Err(DbError::UnsupportedPageLayout {
                page_size,
                tuple_size,
                slots,
            });
        }
        Ok(slots)
    }

    /// Returns the header size in bytes for a page with `num_slots` slots.
    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Returns a zeroed page buffer: a page with every slot free.
    pub fn create_empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Decodes a page from exactly one page worth of bytes.
    /// The page size is taken from `data.len()`.
    pub fn new(page_id: PageId, schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        let page_size = data.len();
        let tuple_size = schema.tuple_size();
        let num_slots = Self::check_layout(page_size, tuple_size)?;
        let header_size = Self::header_size(num_slots);

        let header = data[..header_size].to_vec();
        let mut slots = Vec::with_capacity(num_slots);
        let mut num_empty = 0;

        for i in 0..num_slots {
            if header[i / 8] & (1 << (i % 8)) == 0 {
                slots.push(None);
                num_empty += 1;
                continue;
            }

            let offset = header_size + i * tuple_size;
            let mut raw = &data[offset..offset + tuple_size];
            let mut tuple = Tuple::decode(schema.clone(), &mut raw)
                .ok_or_else(|| DbError::corrupted(page_id, format!("slot {} is undecodable", i)))?;
            tuple.set_record_id(Some(RecordId::new(page_id, SlotId::new(i as u16))));
            slots.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            page_size,
            header,
            slots,
            num_empty,
            dirty: false,
            dirtied_by: None,
        })
    }

    /// Creates a page with every slot free.
    pub fn empty(page_id: PageId, schema: Arc<Schema>, page_size: usize) -> Self {
        let num_slots = Self::slots_per_page(page_size, schema.tuple_size());
        Self {
            page_id,
            schema,
            page_size,
            header: vec![0u8; Self::header_size(num_slots)],
            slots: vec![None; num_slots],
            num_empty: num_slots,
            dirty: false,
            dirtied_by: None,
        }
    }

    /// Encodes the page into exactly `page_size` bytes.
    pub fn to_bytes(&self) -> Bytes {
        let tuple_size = self.schema.tuple_size();
        let mut buf = BytesMut::with_capacity(self.page_size);

        buf.put_slice(&self.header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.encode(&mut buf),
                None => buf.put_bytes(0, tuple_size),
            }
        }
        buf.put_bytes(0, self.page_size - buf.len());

        buf.freeze()
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the schema every tuple on this page follows.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the total number of slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of free slots.
    pub fn num_empty_slots(&self) -> usize {
        self.num_empty
    }

    /// Returns whether the given slot holds a tuple.
    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        let i = slot_id.as_usize();
        i < self.slots.len() && self.header[i / 8] & (1 << (i % 8)) != 0
    }

    /// Returns the tuple in the given slot, if occupied.
    pub fn tuple(&self, slot_id: SlotId) -> Option<&Tuple> {
        self.slots.get(slot_id.as_usize()).and_then(Option::as_ref)
    }

    /// Stores the tuple in the lowest-numbered free slot, records the location
    /// in `tuple`, and marks the page dirty.
    ///
    /// Fails with [`DbError::PageFull`] only when no slot is free. A tuple
    /// whose schema differs from the page's fails with
    /// [`DbError::SchemaMismatch`] instead, so callers scanning for room can
    /// tell the two apart.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if !tuple.conforms_to(&self.schema) {
            return Err(DbError::SchemaMismatch(self.page_id.table_id));
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(DbError::PageFull(self.page_id))?;

        let slot_number = u16::try_from(slot).map_err(|_| DbError::UnsupportedPageLayout {
            page_size: self.page_size,
            tuple_size: self.schema.tuple_size(),
            slots: self.slots.len(),
        })?;
        let record_id = RecordId::new(self.page_id, SlotId::new(slot_number));
        tuple.set_record_id(Some(record_id));
        self.set_slot_used(slot, true);
        self.slots[slot] = Some(tuple.clone());
        self.num_empty -= 1;
        self.dirty = true;

        Ok(record_id)
    }

    /// Frees the slot referenced by the tuple's record id and marks the page
    /// dirty. Storage is not compacted; the slot is reused by later inserts.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let slot = self.occupied_slot_of(tuple)?;

        self.set_slot_used(slot, false);
        self.slots[slot] = None;
        self.num_empty += 1;
        self.dirty = true;

        Ok(())
    }

    /// Overwrites the tuple stored at `tuple`'s record id with `tuple`'s values.
    pub fn update_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        if !tuple.conforms_to(&self.schema) {
            return Err(DbError::SchemaMismatch(self.page_id.table_id));
        }
        let slot = self.occupied_slot_of(tuple)?;

        self.slots[slot] = Some(tuple.clone());
        self.dirty = true;

        Ok(())
    }

    /// Iterates over the stored tuples in ascending slot order.
    /// Each call scans the current occupancy afresh.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.slots.iter().flatten()
    }

    /// Marks the page dirty on behalf of `tid`, or clean when `None`.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid.is_some();
        self.dirtied_by = tid;
    }

    /// Returns whether the page changed since it was last read or written.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the transaction that last dirtied the page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    fn occupied_slot_of(&self, tuple: &Tuple) -> Result<usize> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id != self.page_id || !self.is_slot_used(record_id.slot_id) {
            return Err(DbError::TupleNotOnPage {
                page_id: self.page_id,
                record_id,
            });
        }
        Ok(record_id.slot_id.as_usize())
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }
}
