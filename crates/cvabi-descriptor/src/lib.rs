//! Descriptor-table codec for contract-violation metadata.
//!
//! A compiler emits, per violation site, a read-only *descriptor* (a 16-byte
//! header followed by an entry table and an optional index) and a *static
//! data blob* holding packed field values. The runtime that reads them was not
//! necessarily built against the same producer version, so every lookup here
//! degrades to "absent" instead of failing:
//!
//! - [`Descriptor::parse`] decodes the header, entry table and index as a
//!   borrowed view, validating according to a [`Validation`] mode.
//! - [`Resolver`] maps a [`FieldId`] to a typed [`FieldValue`], applying the
//!   vendor namespace filter and bounds/alignment checks.
//! - [`TlvReader`] walks the optional per-violation dynamic stream.
//! - [`DescriptorBuilder`] and [`TlvWriter`] are the producer side, used by
//!   tooling and tests.
//!
//! All multi-byte integers are in native byte order.

mod builder;
mod bytes;
mod descriptor;
mod entry;
mod error;
mod field;
mod header;
mod index;
mod resolve;
mod tlv;
mod validation;

pub use builder::{AlignedBytes, BuildError, BuiltDescriptor, DescriptorBuilder};
pub use descriptor::Descriptor;
pub use entry::{Entry, EntryLocation, EntryTable};
pub use error::DescriptorError;
pub use field::{
    standard_field, FieldId, FieldKind, FieldKindParseError, FieldRange, StandardField,
    TableCatalog, VendorCatalog, VendorRegistry, STANDARD_FIELDS,
};
pub use header::{parse_header, Header};
pub use index::{Index, IndexRecord};
pub use resolve::{read_value, FieldValue, ResolvedField, Resolver};
pub use tlv::{TlvError, TlvReader, TlvRecord, TlvWriter};
pub use validation::{Validation, ValidationParseError};

pub type Result<T> = std::result::Result<T, DescriptorError>;
