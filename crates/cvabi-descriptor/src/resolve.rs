//! Typed field extraction from the static data blob.

use tracing::debug;

use crate::bytes::{read_u16_ne, read_u32_ne, read_u64_ne, read_u8, read_usize_ne};
use crate::{Descriptor, EntryLocation, FieldId, FieldKind, VendorRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Pointer(usize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// Payload of a dynamic record whose length does not match its kind, or
    /// whose identifier has no known kind.
    Bytes(&'a [u8]),
}

impl FieldValue<'_> {
    /// Integer view of fixed-width values.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::Pointer(p) => Some(p as u64),
            FieldValue::U8(v) => Some(v as u64),
            FieldValue::U16(v) => Some(v as u64),
            FieldValue::U32(v) => Some(v as u64),
            FieldValue::U64(v) => Some(v),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_pointer(&self) -> Option<usize> {
        match *self {
            FieldValue::Pointer(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedField<'a> {
    pub id: FieldId,
    pub location: EntryLocation,
    pub kind: FieldKind,
    pub value: FieldValue<'a>,
}

/// Reads a `kind` value at `offset`, or `None` when the offset is misaligned
/// for the kind or the value would extend past `data_size` or `data`.
pub fn read_value<'a>(
    kind: FieldKind,
    data: &'a [u8],
    data_size: usize,
    offset: usize,
) -> Option<FieldValue<'a>> {
    if offset % kind.align() != 0 {
        return None;
    }
    let end = offset.checked_add(kind.size())?;
    if end > data_size || end > data.len() {
        return None;
    }
    decode_fixed(kind, data.get(offset..end)?)
}

/// Decodes a fixed-width value from the start of `s`, ignoring alignment.
pub(crate) fn decode_fixed(kind: FieldKind, s: &[u8]) -> Option<FieldValue<'static>> {
    let v = match kind {
        FieldKind::Pointer => FieldValue::Pointer(read_usize_ne(s, 0)?),
        FieldKind::U8 => FieldValue::U8(read_u8(s, 0)?),
        FieldKind::U16 => FieldValue::U16(read_u16_ne(s, 0)?),
        FieldKind::U32 => FieldValue::U32(read_u32_ne(s, 0)?),
        FieldKind::U64 => FieldValue::U64(read_u64_ne(s, 0)?),
    };
    Some(v)
}

/// Resolves field identifiers against one descriptor and its data blob.
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'a> {
    descriptor: Descriptor<'a>,
    data: &'a [u8],
    vendors: &'a VendorRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(descriptor: Descriptor<'a>, data: &'a [u8], vendors: &'a VendorRegistry) -> Self {
        Self {
            descriptor,
            data,
            vendors,
        }
    }

    pub fn descriptor(&self) -> &Descriptor<'a> {
        &self.descriptor
    }

    pub fn vendors(&self) -> &'a VendorRegistry {
        self.vendors
    }

    /// Kind of `id` under this descriptor's vendor namespace.
    pub fn kind_of(&self, id: FieldId) -> Option<FieldKind> {
        self.vendors
            .kind_of(id, self.descriptor.header().vendor_id)
    }

    /// Location of `id` in the data blob, or `None` when the id is unknown,
    /// belongs to another vendor, or has no entry.
    pub fn locate(&self, id: FieldId) -> Option<(EntryLocation, FieldKind)> {
        let kind = self.kind_of(id)?;
        let entry = self.descriptor.find(id)?;
        Some((entry.location()?, kind))
    }

    pub fn resolve(&self, id: FieldId) -> Option<ResolvedField<'a>> {
        let (location, kind) = self.locate(id)?;
        self.resolve_at(id, location, kind)
    }

    /// Reads a value from an already located entry.
    pub fn resolve_at(
        &self,
        id: FieldId,
        location: EntryLocation,
        kind: FieldKind,
    ) -> Option<ResolvedField<'a>> {
        let data_size = self.descriptor.header().data_size as usize;
        let offset = location.offset() as usize;
        let Some(value) = read_value(kind, self.data, data_size, offset) else {
            debug!(
                field = %id,
                offset,
                kind = %kind,
                data_size,
                "descriptor entry out of bounds or misaligned; treating field as absent"
            );
            return None;
        };
        Some(ResolvedField {
            id,
            location,
            kind,
            value,
        })
    }

    /// Every entry that resolves, in table order, skipping duplicates.
    pub fn resolve_all(&self) -> Vec<ResolvedField<'a>> {
        let mut out: Vec<ResolvedField<'a>> = Vec::new();
        for e in self.descriptor.entries().iter() {
            if out.iter().any(|f| f.id == e.field) {
                continue;
            }
            if let Some(f) = self.resolve(e.field) {
                out.push(f);
            }
        }
        out
    }
}
