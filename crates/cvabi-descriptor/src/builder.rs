//! Producer side: lays out a data blob and emits the matching descriptor.

use std::collections::BTreeMap;

use cvabi_contracts::{
    FLAG_HAS_INDEX, FLAG_SORTED, FORMAT_VERSION, HEADER_MAX_SIZE, HEADER_MIN_SIZE,
};
use thiserror::Error;

use crate::bytes::align_up;
use crate::{Entry, FieldId, FieldKind, Header, Index, IndexRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{0} entries exceed the 65535-entry limit")]
    TooManyEntries(usize),
    #[error("data blob of {0} bytes exceeds the u32 size field")]
    DataTooLarge(usize),
    #[error("header_size {0} outside 16..=256")]
    HeaderSize(u16),
    #[error("data alignment {0} must be a power of two no larger than {max}", max = AlignedBytes::ALIGN)]
    Alignment(u8),
    #[error("field id 0 is reserved")]
    ReservedId,
}

/// A byte buffer whose base address is aligned to [`AlignedBytes::ALIGN`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBytes {
    pub const ALIGN: usize = core::mem::align_of::<u64>();

    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(8)],
            len,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = Self::zeroed(bytes.len());
        out.as_mut_slice().copy_from_slice(bytes);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `words` owns at least `len` initialized bytes and u8 has no
        // alignment requirement.
        unsafe { core::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; the borrow of `self` is exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, self.len) }
    }
}

impl core::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct BuiltDescriptor {
    pub header: Header,
    pub descriptor: Vec<u8>,
    pub data: AlignedBytes,
}

#[derive(Debug, Clone, Copy)]
struct PendingField {
    id: FieldId,
    kind: FieldKind,
    value: u64,
}

/// Builds a descriptor and its data blob.
///
/// Values are placed in insertion order at their natural alignment. Raw
/// entries point at arbitrary offsets without contributing data, which is how
/// tests produce malformed tables.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    version: u8,
    vendor_id: u8,
    sorted: bool,
    index: bool,
    header_size: u16,
    alignment: Option<u8>,
    data_size: Option<u32>,
    fields: Vec<PendingField>,
    raw_entries: Vec<Entry>,
}

impl DescriptorBuilder {
    pub fn new(vendor_id: u8) -> Self {
        Self {
            version: FORMAT_VERSION,
            vendor_id,
            sorted: false,
            index: false,
            header_size: HEADER_MIN_SIZE as u16,
            alignment: None,
            data_size: None,
            fields: Vec::new(),
            raw_entries: Vec::new(),
        }
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn with_index(mut self, index: bool) -> Self {
        self.index = index;
        self
    }

    pub fn header_size(mut self, header_size: u16) -> Self {
        self.header_size = header_size;
        self
    }

    pub fn alignment(mut self, alignment: u8) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Overrides the declared data size; the blob itself is not resized.
    pub fn data_size(mut self, data_size: u32) -> Self {
        self.data_size = Some(data_size);
        self
    }

    pub fn value(mut self, id: FieldId, kind: FieldKind, value: u64) -> Self {
        self.fields.push(PendingField { id, kind, value });
        self
    }

    pub fn pointer(self, id: FieldId, addr: usize) -> Self {
        self.value(id, FieldKind::Pointer, addr as u64)
    }

    pub fn u8(self, id: FieldId, v: u8) -> Self {
        self.value(id, FieldKind::U8, v as u64)
    }

    pub fn u16(self, id: FieldId, v: u16) -> Self {
        self.value(id, FieldKind::U16, v as u64)
    }

    pub fn u32(self, id: FieldId, v: u32) -> Self {
        self.value(id, FieldKind::U32, v as u64)
    }

    pub fn u64(self, id: FieldId, v: u64) -> Self {
        self.value(id, FieldKind::U64, v)
    }

    pub fn raw_entry(mut self, id: FieldId, offset: u32) -> Self {
        self.raw_entries.push(Entry { field: id, offset });
        self
    }

    pub fn build(&self) -> Result<BuiltDescriptor, BuildError> {
        if !(HEADER_MIN_SIZE..=HEADER_MAX_SIZE).contains(&(self.header_size as usize)) {
            return Err(BuildError::HeaderSize(self.header_size));
        }

        let mut offsets = Vec::with_capacity(self.fields.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;
        for f in &self.fields {
            if f.id == FieldId::INVALID {
                return Err(BuildError::ReservedId);
            }
            let at = align_up(cursor, f.kind.align()).ok_or(BuildError::DataTooLarge(cursor))?;
            offsets.push(at);
            cursor = at + f.kind.size();
            max_align = max_align.max(f.kind.align());
        }
        let data_size = match self.data_size {
            Some(n) => n,
            None => u32::try_from(cursor).map_err(|_| BuildError::DataTooLarge(cursor))?,
        };

        let alignment = self.alignment.unwrap_or(max_align as u8);
        if !alignment.is_power_of_two() || alignment as usize > AlignedBytes::ALIGN {
            return Err(BuildError::Alignment(alignment));
        }

        let mut data = AlignedBytes::zeroed(cursor);
        let blob = data.as_mut_slice();
        for (f, &at) in self.fields.iter().zip(&offsets) {
            let dst = &mut blob[at..at + f.kind.size()];
            match f.kind {
                FieldKind::Pointer => dst.copy_from_slice(&(f.value as usize).to_ne_bytes()),
                FieldKind::U8 => dst.copy_from_slice(&(f.value as u8).to_ne_bytes()),
                FieldKind::U16 => dst.copy_from_slice(&(f.value as u16).to_ne_bytes()),
                FieldKind::U32 => dst.copy_from_slice(&(f.value as u32).to_ne_bytes()),
                FieldKind::U64 => dst.copy_from_slice(&f.value.to_ne_bytes()),
            }
        }

        let mut entries: Vec<Entry> = self
            .fields
            .iter()
            .zip(&offsets)
            .map(|(f, &at)| Entry {
                field: f.id,
                offset: at as u32,
            })
            .chain(self.raw_entries.iter().copied())
            .collect();
        if self.sorted {
            entries.sort_by_key(|e| e.field);
        }
        let num_entries =
            u16::try_from(entries.len()).map_err(|_| BuildError::TooManyEntries(entries.len()))?;

        let mut flags = 0u8;
        if self.sorted {
            flags |= FLAG_SORTED;
        }
        if self.index {
            flags |= FLAG_HAS_INDEX;
        }
        let header = Header {
            version: self.version,
            vendor_id: self.vendor_id,
            flags,
            num_entries,
            header_size: self.header_size,
            data_size,
            data_alignment: alignment,
        };

        let mut descriptor = header.encode().to_vec();
        descriptor.resize(self.header_size as usize, 0);
        for e in &entries {
            descriptor.extend_from_slice(&e.encode());
        }
        if self.index {
            let records = index_records(&entries);
            if let Some(off) = Index::section_offset(descriptor.len()) {
                descriptor.resize(off, 0);
            }
            descriptor.extend_from_slice(&(records.len() as u16).to_ne_bytes());
            descriptor.extend_from_slice(&[0, 0]);
            for r in &records {
                descriptor.extend_from_slice(&r.encode());
            }
        }

        Ok(BuiltDescriptor {
            header,
            descriptor,
            data,
        })
    }
}

/// One record per distinct key, covering the run that starts at the key's
/// first occurrence.
fn index_records(entries: &[Entry]) -> Vec<IndexRecord> {
    let mut first: BTreeMap<FieldId, (usize, usize)> = BTreeMap::new();
    for (i, e) in entries.iter().enumerate() {
        if first.contains_key(&e.field) {
            continue;
        }
        let run = entries[i..]
            .iter()
            .take_while(|x| x.field == e.field)
            .count();
        first.insert(e.field, (i, run));
    }
    first
        .into_iter()
        .map(|(key, (start, count))| IndexRecord {
            key,
            start: start as u16,
            count: count as u16,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Descriptor, Validation};

    #[test]
    fn places_values_at_natural_alignment() {
        let built = DescriptorBuilder::new(1)
            .u8(FieldId::ASSERTION_KIND, 3)
            .u32(FieldId::LINE, 10)
            .u8(FieldId::EVALUATION_FLAGS, 1)
            .u64(FieldId::vendor(1, 9), 7)
            .build()
            .unwrap();
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();
        let offsets: Vec<u32> = d.entries().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(built.header.data_size, 24);
        assert_eq!(built.header.data_alignment, 8);
        assert_eq!(built.data.len(), 24);
        assert_eq!(built.data.as_slice().as_ptr() as usize % AlignedBytes::ALIGN, 0);
    }

    #[test]
    fn index_covers_duplicate_runs() {
        let entries = [
            Entry {
                field: FieldId(1),
                offset: 0,
            },
            Entry {
                field: FieldId(2),
                offset: 8,
            },
            Entry {
                field: FieldId(2),
                offset: 16,
            },
        ];
        let records = index_records(&entries);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].range(), 1..3);
    }

    #[test]
    fn rejects_bad_settings() {
        assert_eq!(
            DescriptorBuilder::new(0).header_size(8).build().unwrap_err(),
            BuildError::HeaderSize(8)
        );
        assert_eq!(
            DescriptorBuilder::new(0).alignment(3).build().unwrap_err(),
            BuildError::Alignment(3)
        );
        assert_eq!(
            DescriptorBuilder::new(0)
                .u8(FieldId::INVALID, 1)
                .build()
                .unwrap_err(),
            BuildError::ReservedId
        );
    }

    #[test]
    fn empty_descriptor_is_valid() {
        let built = DescriptorBuilder::new(0).with_index(true).build().unwrap();
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();
        assert!(d.entries().is_empty());
        assert_eq!(d.index().map(|i| i.len()), Some(0));
        assert_eq!(built.header.data_alignment, 1);
    }
}
