//! Shared, version-pinned wire constants and report identifiers.
//!
//! These constants are the single source of truth for the binary descriptor
//! layout and for the schema strings that appear in machine-readable I/O.
//! Producers (compilers, `cvabi build`) and consumers (the runtime, `cvabi
//! inspect`) must agree on them.

pub const CVABI_LAYOUT_SCHEMA_VERSION: &str = "cvabi.layout@0.1.0";
pub const CVABI_INSPECT_REPORT_SCHEMA_VERSION: &str = "cvabi.inspect.report@0.1.0";
pub const CVABI_VENDOR_CATALOG_SCHEMA_VERSION: &str = "cvabi.vendor_catalog@0.1.0";
pub const CVABI_VIOLATION_PAYLOAD_PREFIX: &str = "CVABI_VIOLATION_V1 ";

/// Format version written by current producers.
pub const FORMAT_VERSION: u8 = 2;
/// Oldest format version a consumer accepts.
pub const MIN_FORMAT_VERSION: u8 = 1;

pub const HEADER_MIN_SIZE: usize = 16;
pub const HEADER_MAX_SIZE: usize = 256;
pub const ENTRY_SIZE: usize = 8;
pub const INDEX_PREAMBLE_SIZE: usize = 4;
pub const INDEX_RECORD_SIZE: usize = 6;
pub const TLV_HEADER_SIZE: usize = 4;

pub const FLAG_SORTED: u8 = 1 << 0;
pub const FLAG_HAS_INDEX: u8 = 1 << 1;
pub const FLAG_RESERVED_MASK: u8 = !(FLAG_SORTED | FLAG_HAS_INDEX);

pub const FIELD_ID_INVALID: u16 = 0x0000;
pub const FIELD_ID_STANDARD_FIRST: u16 = 0x0001;
pub const FIELD_ID_STANDARD_LAST: u16 = 0x00FF;
pub const FIELD_ID_FUTURE_FIRST: u16 = 0x0100;
pub const FIELD_ID_FUTURE_LAST: u16 = 0x7FFF;
pub const FIELD_ID_VENDOR_BIT: u16 = 0x8000;
pub const FIELD_ID_VENDOR_MASK: u16 = 0x7F00;
pub const FIELD_ID_VENDOR_SHIFT: u32 = 8;
pub const FIELD_ID_LOCAL_MASK: u16 = 0x00FF;

/// Environment variable overriding the runtime's descriptor validation mode.
pub const ENV_VALIDATION: &str = "CVABI_VALIDATION";
