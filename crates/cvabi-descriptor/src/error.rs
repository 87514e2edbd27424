use thiserror::Error;

/// A descriptor that failed validation.
///
/// Only [`crate::Validation::Hardened`] reports structural problems; the
/// trusting mode reports nothing beyond [`DescriptorError::Truncated`], which
/// guards the fixed header read itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("header_size {0} outside the supported range")]
    HeaderSize(u16),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("reserved flag bits set: {0:#04x}")]
    ReservedFlags(u8),

    #[error("data_alignment {0} is not a power of two")]
    Alignment(u8),

    #[error("entry table of {num_entries} entries overflows the address space")]
    EntryTableOverflow { num_entries: u16 },

    #[error("entry table truncated: need {need} bytes, have {have}")]
    EntryTableTruncated { need: usize, have: usize },

    #[error("sorted flag set but entry {position} ({field}) is out of order")]
    Unsorted { position: usize, field: String },

    #[error("index flag set but the index section is truncated")]
    IndexTruncated,

    #[error(
        "index record {record} range {start}+{count} exceeds {num_entries} entries"
    )]
    IndexRange {
        record: usize,
        start: u16,
        count: u16,
        num_entries: u16,
    },

    #[error("index record {record} is not in ascending key order")]
    IndexUnsorted { record: usize },

    #[error("index record {record} disagrees with the entry table for {key}")]
    IndexInconsistent { record: usize, key: String },
}
