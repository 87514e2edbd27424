use std::ops::Range;

use cvabi_contracts::ENTRY_SIZE;

use crate::bytes::{read_u16_ne, read_u32_ne};
use crate::{FieldId, FieldRange};

/// One `(field_type, reserved, offset)` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub field: FieldId,
    pub offset: u32,
}

/// Where an entry's value lives, keyed by the identifier's range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryLocation {
    Standard {
        offset: u32,
    },
    FutureStandard {
        offset: u32,
    },
    Vendor {
        vendor: u8,
        local_id: u8,
        offset: u32,
    },
}

impl EntryLocation {
    pub fn offset(self) -> u32 {
        match self {
            EntryLocation::Standard { offset }
            | EntryLocation::FutureStandard { offset }
            | EntryLocation::Vendor { offset, .. } => offset,
        }
    }
}

impl Entry {
    /// `None` for the reserved identifier 0.
    pub fn location(&self) -> Option<EntryLocation> {
        let offset = self.offset;
        match self.field.range() {
            FieldRange::Invalid => None,
            FieldRange::Standard => Some(EntryLocation::Standard { offset }),
            FieldRange::FutureStandard => Some(EntryLocation::FutureStandard { offset }),
            FieldRange::Vendor { vendor, local_id } => Some(EntryLocation::Vendor {
                vendor,
                local_id,
                offset,
            }),
        }
    }

    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..2].copy_from_slice(&self.field.0.to_ne_bytes());
        out[4..8].copy_from_slice(&self.offset.to_ne_bytes());
        out
    }
}

/// Borrowed view of the packed entry array.
#[derive(Clone, Copy, Debug)]
pub struct EntryTable<'a> {
    bytes: &'a [u8],
    len: usize,
    sorted: bool,
}

impl<'a> EntryTable<'a> {
    /// Views up to `num_entries` records from `bytes`. A short slice yields a
    /// shorter table instead of failing.
    pub fn new(bytes: &'a [u8], num_entries: usize, sorted: bool) -> Self {
        let len = num_entries.min(bytes.len() / ENTRY_SIZE);
        Self {
            bytes: &bytes[..len * ENTRY_SIZE],
            len,
            sorted,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn get(&self, i: usize) -> Option<Entry> {
        let base = i.checked_mul(ENTRY_SIZE)?;
        Some(Entry {
            field: FieldId(read_u16_ne(self.bytes, base)?),
            offset: read_u32_ne(self.bytes, base + 4)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Entry> + 'a {
        let table = *self;
        (0..table.len).filter_map(move |i| table.get(i))
    }

    /// First entry for `field`, using binary search when the table is sorted.
    pub fn find(&self, field: FieldId) -> Option<(usize, Entry)> {
        self.find_in(0..self.len, field)
    }

    /// Like [`EntryTable::find`], restricted to `range` (clamped to the table).
    pub fn find_in(&self, range: Range<usize>, field: FieldId) -> Option<(usize, Entry)> {
        let end = range.end.min(self.len);
        let start = range.start.min(end);
        if self.sorted {
            self.lower_bound_in(start, end, field)
        } else {
            self.scan_in(start, end, field)
        }
    }

    pub fn find_linear(&self, field: FieldId) -> Option<(usize, Entry)> {
        self.scan_in(0, self.len, field)
    }

    /// Binary search regardless of the sorted flag. Only meaningful for a
    /// table that really is sorted.
    pub fn find_sorted(&self, field: FieldId) -> Option<(usize, Entry)> {
        self.lower_bound_in(0, self.len, field)
    }

    fn scan_in(&self, start: usize, end: usize, field: FieldId) -> Option<(usize, Entry)> {
        (start..end).find_map(|i| {
            let e = self.get(i)?;
            (e.field == field).then_some((i, e))
        })
    }

    // Lower bound keeps duplicate ids resolving to their first occurrence.
    fn lower_bound_in(
        &self,
        mut lo: usize,
        mut hi: usize,
        field: FieldId,
    ) -> Option<(usize, Entry)> {
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let e = self.get(mid)?;
            if e.field < field {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let e = self.get(lo)?;
        (e.field == field).then_some((lo, e))
    }

    /// Position of the first entry that breaks non-decreasing order.
    pub fn first_unsorted(&self) -> Option<usize> {
        let mut prev: Option<FieldId> = None;
        for (i, e) in self.iter().enumerate() {
            if prev.is_some_and(|p| e.field < p) {
                return Some(i);
            }
            prev = Some(e.field);
        }
        None
    }
}
