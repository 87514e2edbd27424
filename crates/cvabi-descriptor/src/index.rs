//! Optional lookup index over the entry table.
//!
//! The section starts at the first 2-byte boundary after the entry table:
//! a `record_count(u16), reserved(u16)` preamble followed by `record_count`
//! six-byte `(key, entry_start, entry_count)` records in ascending key order.
//! The index only narrows the search; resolution never depends on it.

use std::ops::Range;

use cvabi_contracts::{INDEX_PREAMBLE_SIZE, INDEX_RECORD_SIZE};

use crate::bytes::{align_up, read_u16_ne};
use crate::{DescriptorError, EntryTable, FieldId, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub key: FieldId,
    pub start: u16,
    pub count: u16,
}

impl IndexRecord {
    pub fn range(&self) -> Range<usize> {
        let start = self.start as usize;
        start..start + self.count as usize
    }

    pub fn encode(&self) -> [u8; INDEX_RECORD_SIZE] {
        let mut out = [0u8; INDEX_RECORD_SIZE];
        out[0..2].copy_from_slice(&self.key.0.to_ne_bytes());
        out[2..4].copy_from_slice(&self.start.to_ne_bytes());
        out[4..6].copy_from_slice(&self.count.to_ne_bytes());
        out
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Index<'a> {
    records: &'a [u8],
    len: usize,
}

impl<'a> Index<'a> {
    /// Byte offset of the index preamble given the end of the entry table.
    pub fn section_offset(entries_end: usize) -> Option<usize> {
        align_up(entries_end, 2)
    }

    /// Reads the index section starting at `offset`. `None` when the preamble
    /// or the declared records do not fit in `descriptor`.
    pub fn parse(descriptor: &'a [u8], offset: usize) -> Option<Self> {
        let count = read_u16_ne(descriptor, offset)? as usize;
        let start = offset.checked_add(INDEX_PREAMBLE_SIZE)?;
        let end = start.checked_add(count.checked_mul(INDEX_RECORD_SIZE)?)?;
        Some(Self {
            records: descriptor.get(start..end)?,
            len: count,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> Option<IndexRecord> {
        let base = i.checked_mul(INDEX_RECORD_SIZE)?;
        Some(IndexRecord {
            key: FieldId(read_u16_ne(self.records, base)?),
            start: read_u16_ne(self.records, base + 2)?,
            count: read_u16_ne(self.records, base + 4)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexRecord> + 'a {
        let index = *self;
        (0..index.len).filter_map(move |i| index.get(i))
    }

    pub fn lookup(&self, key: FieldId) -> Option<IndexRecord> {
        let (mut lo, mut hi) = (0usize, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let r = self.get(mid)?;
            match r.key.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(r),
            }
        }
        None
    }

    /// Hardened consistency check against the entry table: keys strictly
    /// ascending, ranges within the table, every entry in a range carrying
    /// the record's key, and each range starting at its key's first
    /// occurrence.
    pub fn validate(&self, table: &EntryTable<'_>, num_entries: u16) -> Result<()> {
        let mut prev: Option<FieldId> = None;
        for (record, r) in self.iter().enumerate() {
            if prev.is_some_and(|p| r.key <= p) {
                return Err(DescriptorError::IndexUnsorted { record });
            }
            prev = Some(r.key);

            if r.start as usize + r.count as usize > num_entries as usize {
                return Err(DescriptorError::IndexRange {
                    record,
                    start: r.start,
                    count: r.count,
                    num_entries,
                });
            }
            let inconsistent = || DescriptorError::IndexInconsistent {
                record,
                key: r.key.to_string(),
            };
            if r.count == 0 {
                return Err(inconsistent());
            }
            for i in r.range() {
                if table.get(i).map(|e| e.field) != Some(r.key) {
                    return Err(inconsistent());
                }
            }
            if table.find_linear(r.key).map(|(i, _)| i) != Some(r.start as usize) {
                return Err(inconsistent());
            }
        }
        Ok(())
    }
}
