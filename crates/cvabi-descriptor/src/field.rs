//! Field identifiers, the standard field catalog and vendor catalogs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cvabi_contracts::{
    FIELD_ID_FUTURE_LAST, FIELD_ID_INVALID, FIELD_ID_LOCAL_MASK, FIELD_ID_STANDARD_LAST,
    FIELD_ID_VENDOR_BIT, FIELD_ID_VENDOR_MASK, FIELD_ID_VENDOR_SHIFT,
};

/// A 16-bit field identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u16);

/// The partition of the identifier space an id falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRange {
    Invalid,
    Standard,
    FutureStandard,
    Vendor { vendor: u8, local_id: u8 },
}

impl FieldId {
    pub const INVALID: FieldId = FieldId(FIELD_ID_INVALID);

    pub const COMMENT: FieldId = FieldId(0x0001);
    pub const FILE_NAME: FieldId = FieldId(0x0002);
    pub const FUNCTION_NAME: FieldId = FieldId(0x0003);
    pub const LINE: FieldId = FieldId(0x0004);
    pub const COLUMN: FieldId = FieldId(0x0005);
    pub const SOURCE_LOCATION: FieldId = FieldId(0x0006);
    pub const LABELS: FieldId = FieldId(0x0010);
    pub const ASSERTION_KIND: FieldId = FieldId(0x0011);
    pub const EVALUATION_FLAGS: FieldId = FieldId(0x0012);

    /// Builds `0x8000 | vendor << 8 | local_id`. Only the low seven bits of
    /// `vendor` fit in the identifier.
    pub const fn vendor(vendor: u8, local_id: u8) -> FieldId {
        FieldId(
            FIELD_ID_VENDOR_BIT
                | (((vendor as u16) << FIELD_ID_VENDOR_SHIFT) & FIELD_ID_VENDOR_MASK)
                | local_id as u16,
        )
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn range(self) -> FieldRange {
        let v = self.0;
        if v == FIELD_ID_INVALID {
            FieldRange::Invalid
        } else if v <= FIELD_ID_STANDARD_LAST {
            FieldRange::Standard
        } else if v <= FIELD_ID_FUTURE_LAST {
            FieldRange::FutureStandard
        } else {
            FieldRange::Vendor {
                vendor: ((v & FIELD_ID_VENDOR_MASK) >> FIELD_ID_VENDOR_SHIFT) as u8,
                local_id: (v & FIELD_ID_LOCAL_MASK) as u8,
            }
        }
    }

    pub fn is_vendor(self) -> bool {
        self.0 & FIELD_ID_VENDOR_BIT != 0
    }

    /// Embedded vendor tag, for vendor-range identifiers.
    pub fn vendor_tag(self) -> Option<u8> {
        match self.range() {
            FieldRange::Vendor { vendor, .. } => Some(vendor),
            _ => None,
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for FieldId {
    fn from(v: u16) -> Self {
        FieldId(v)
    }
}

/// The in-memory representation of a field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Pointer,
    U8,
    U16,
    U32,
    U64,
}

impl FieldKind {
    pub const fn size(self) -> usize {
        match self {
            FieldKind::Pointer => core::mem::size_of::<usize>(),
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::U64 => 8,
        }
    }

    pub const fn align(self) -> usize {
        match self {
            FieldKind::Pointer => core::mem::align_of::<usize>(),
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::U64 => core::mem::align_of::<u64>(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Pointer => "pointer",
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::U64 => "u64",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FieldKindParseError {
    value: String,
}

impl fmt::Display for FieldKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid field kind {:?} (expected one of: pointer, u8, u16, u32, u64)",
            self.value
        )
    }
}

impl std::error::Error for FieldKindParseError {}

impl FromStr for FieldKind {
    type Err = FieldKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "pointer" | "ptr" => Ok(FieldKind::Pointer),
            "u8" => Ok(FieldKind::U8),
            "u16" => Ok(FieldKind::U16),
            "u32" => Ok(FieldKind::U32),
            "u64" => Ok(FieldKind::U64),
            _ => Err(FieldKindParseError { value: s }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardField {
    pub id: FieldId,
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The fixed standard field catalog.
pub const STANDARD_FIELDS: &[StandardField] = &[
    StandardField {
        id: FieldId::COMMENT,
        name: "comment",
        kind: FieldKind::Pointer,
    },
    StandardField {
        id: FieldId::FILE_NAME,
        name: "file_name",
        kind: FieldKind::Pointer,
    },
    StandardField {
        id: FieldId::FUNCTION_NAME,
        name: "function_name",
        kind: FieldKind::Pointer,
    },
    StandardField {
        id: FieldId::LINE,
        name: "line",
        kind: FieldKind::U32,
    },
    StandardField {
        id: FieldId::COLUMN,
        name: "column",
        kind: FieldKind::U32,
    },
    StandardField {
        id: FieldId::SOURCE_LOCATION,
        name: "source_location",
        kind: FieldKind::Pointer,
    },
    StandardField {
        id: FieldId::LABELS,
        name: "labels",
        kind: FieldKind::U32,
    },
    StandardField {
        id: FieldId::ASSERTION_KIND,
        name: "assertion_kind",
        kind: FieldKind::U8,
    },
    StandardField {
        id: FieldId::EVALUATION_FLAGS,
        name: "evaluation_flags",
        kind: FieldKind::U8,
    },
];

pub fn standard_field(id: FieldId) -> Option<&'static StandardField> {
    STANDARD_FIELDS.iter().find(|f| f.id == id)
}

/// Types of one vendor's fields, keyed by local id.
pub trait VendorCatalog {
    fn field_kind(&self, local_id: u8) -> Option<FieldKind>;

    fn field_name(&self, _local_id: u8) -> Option<&str> {
        None
    }
}

/// A vendor catalog backed by a list of `(local_id, name, kind)` rows.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    fields: BTreeMap<u8, (String, FieldKind)>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, local_id: u8, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(local_id, (name.into(), kind));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl VendorCatalog for TableCatalog {
    fn field_kind(&self, local_id: u8) -> Option<FieldKind> {
        self.fields.get(&local_id).map(|(_, kind)| *kind)
    }

    fn field_name(&self, local_id: u8) -> Option<&str> {
        self.fields.get(&local_id).map(|(name, _)| name.as_str())
    }
}

/// Vendor catalogs known to a consumer, keyed by vendor tag.
///
/// Catalogs are shared, so cloning a registry is cheap and the clone can be
/// extended without touching the original.
#[derive(Clone, Default)]
pub struct VendorRegistry {
    catalogs: BTreeMap<u8, Arc<dyn VendorCatalog + Send + Sync>>,
}

impl VendorRegistry {
    pub const fn new() -> Self {
        Self {
            catalogs: BTreeMap::new(),
        }
    }

    /// Registers `catalog` for `vendor`, replacing any previous one.
    pub fn register(
        &mut self,
        vendor: u8,
        catalog: impl VendorCatalog + Send + Sync + 'static,
    ) -> &mut Self {
        self.catalogs.insert(vendor, Arc::new(catalog));
        self
    }

    pub fn catalog(&self, vendor: u8) -> Option<&(dyn VendorCatalog + Send + Sync)> {
        self.catalogs.get(&vendor).map(|c| c.as_ref())
    }

    pub fn vendors(&self) -> impl Iterator<Item = u8> + '_ {
        self.catalogs.keys().copied()
    }

    /// Kind of `id` when read under a descriptor declaring `active_vendor`.
    ///
    /// Standard ids use the fixed catalog. Vendor ids resolve only when their
    /// embedded tag equals `active_vendor` and the vendor's catalog knows the
    /// local id. Everything else has no kind.
    pub fn kind_of(&self, id: FieldId, active_vendor: u8) -> Option<FieldKind> {
        match id.range() {
            FieldRange::Standard => standard_field(id).map(|f| f.kind),
            FieldRange::Vendor { vendor, local_id } => {
                if vendor != active_vendor {
                    return None;
                }
                self.catalog(vendor)?.field_kind(local_id)
            }
            FieldRange::Invalid | FieldRange::FutureStandard => None,
        }
    }

    pub fn name_of(&self, id: FieldId) -> Option<&str> {
        match id.range() {
            FieldRange::Standard => standard_field(id).map(|f| f.name),
            FieldRange::Vendor { vendor, local_id } => {
                self.catalog(vendor)?.field_name(local_id)
            }
            FieldRange::Invalid | FieldRange::FutureStandard => None,
        }
    }
}

impl fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("vendors", &self.catalogs.keys().collect::<Vec<_>>())
            .finish()
    }
}
