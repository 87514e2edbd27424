//! The fixed 16-byte descriptor header.
//!
//! ```text
//! 0  version        u8
//! 1  vendor_id      u8
//! 2  flags          u8   bit0 sorted, bit1 has-index, bits 2..7 reserved
//! 3  reserved       u8
//! 4  num_entries    u16
//! 6  header_size    u16
//! 8  data_size      u32
//! 12 data_alignment u8
//! 13 reserved       [u8; 3]
//! ```
//!
//! A newer producer may grow the header; `header_size` says where the entry
//! table starts and consumers skip any trailing bytes they do not understand.

use cvabi_contracts::{
    ENTRY_SIZE, FLAG_HAS_INDEX, FLAG_RESERVED_MASK, FLAG_SORTED, HEADER_MAX_SIZE,
    HEADER_MIN_SIZE, MIN_FORMAT_VERSION,
};

use crate::bytes::{read_u16_ne, read_u32_ne, read_u8};
use crate::{DescriptorError, Result, Validation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub vendor_id: u8,
    pub flags: u8,
    pub num_entries: u16,
    pub header_size: u16,
    pub data_size: u32,
    pub data_alignment: u8,
}

impl Header {
    pub fn is_sorted(&self) -> bool {
        self.flags & FLAG_SORTED != 0
    }

    pub fn has_index(&self) -> bool {
        self.flags & FLAG_HAS_INDEX != 0
    }

    pub fn reserved_flags(&self) -> u8 {
        self.flags & FLAG_RESERVED_MASK
    }

    /// Byte length of the entry table, if it fits in `usize`.
    pub fn entries_len(&self) -> Option<usize> {
        (self.num_entries as usize).checked_mul(ENTRY_SIZE)
    }

    /// Byte offset one past the entry table.
    pub fn entries_end(&self) -> Option<usize> {
        (self.header_size as usize).checked_add(self.entries_len()?)
    }

    pub fn encode(&self) -> [u8; HEADER_MIN_SIZE] {
        let mut out = [0u8; HEADER_MIN_SIZE];
        out[0] = self.version;
        out[1] = self.vendor_id;
        out[2] = self.flags;
        out[4..6].copy_from_slice(&self.num_entries.to_ne_bytes());
        out[6..8].copy_from_slice(&self.header_size.to_ne_bytes());
        out[8..12].copy_from_slice(&self.data_size.to_ne_bytes());
        out[12] = self.data_alignment;
        out
    }

    /// Structural checks performed in hardened mode. `descriptor_len` is the
    /// number of bytes the caller can vouch for.
    pub fn validate(&self, descriptor_len: usize) -> Result<()> {
        let header_size = self.header_size as usize;
        if !(HEADER_MIN_SIZE..=HEADER_MAX_SIZE).contains(&header_size) {
            return Err(DescriptorError::HeaderSize(self.header_size));
        }
        if self.version < MIN_FORMAT_VERSION {
            return Err(DescriptorError::UnsupportedVersion(self.version));
        }
        if self.reserved_flags() != 0 {
            return Err(DescriptorError::ReservedFlags(self.reserved_flags()));
        }
        if !self.data_alignment.is_power_of_two() {
            return Err(DescriptorError::Alignment(self.data_alignment));
        }
        let Some(end) = self.entries_end() else {
            return Err(DescriptorError::EntryTableOverflow {
                num_entries: self.num_entries,
            });
        };
        if end > descriptor_len {
            return Err(DescriptorError::EntryTableTruncated {
                need: end,
                have: descriptor_len,
            });
        }
        Ok(())
    }
}

/// Decodes the fixed header from the start of `bytes`.
///
/// Fewer than 16 bytes is always an error, whatever the mode; everything else
/// is checked only under [`Validation::Hardened`].
pub fn parse_header(bytes: &[u8], mode: Validation) -> Result<Header> {
    let truncated = || DescriptorError::Truncated {
        need: HEADER_MIN_SIZE,
        have: bytes.len(),
    };
    if bytes.len() < HEADER_MIN_SIZE {
        return Err(truncated());
    }
    let header = Header {
        version: read_u8(bytes, 0).ok_or_else(truncated)?,
        vendor_id: read_u8(bytes, 1).ok_or_else(truncated)?,
        flags: read_u8(bytes, 2).ok_or_else(truncated)?,
        num_entries: read_u16_ne(bytes, 4).ok_or_else(truncated)?,
        header_size: read_u16_ne(bytes, 6).ok_or_else(truncated)?,
        data_size: read_u32_ne(bytes, 8).ok_or_else(truncated)?,
        data_alignment: read_u8(bytes, 12).ok_or_else(truncated)?,
    };
    if mode.is_hardened() {
        header.validate(bytes.len())?;
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            version: 2,
            vendor_id: 2,
            flags: FLAG_SORTED,
            num_entries: 3,
            header_size: 16,
            data_size: 17,
            data_alignment: 8,
        }
    }

    fn with_room(h: &Header) -> Vec<u8> {
        let mut bytes = h.encode().to_vec();
        bytes.resize(h.entries_end().unwrap(), 0);
        bytes
    }

    #[test]
    fn decodes_every_field() {
        let h = sample();
        let got = parse_header(&with_room(&h), Validation::Hardened).unwrap();
        assert_eq!(got, h);
        assert!(got.is_sorted());
        assert!(!got.has_index());
        assert_eq!(got.entries_end(), Some(16 + 3 * 8));
    }

    #[test]
    fn ignores_reserved_bytes() {
        let h = sample();
        let mut bytes = with_room(&h);
        bytes[3] = 0xAA;
        bytes[13] = 0xBB;
        bytes[15] = 0xCC;
        assert_eq!(parse_header(&bytes, Validation::Hardened).unwrap(), h);
    }

    #[test]
    fn short_input_is_rejected_in_every_mode() {
        for mode in [Validation::Hardened, Validation::Trusting] {
            let err = parse_header(&[0u8; 15], mode).unwrap_err();
            assert_eq!(err, DescriptorError::Truncated { need: 16, have: 15 });
        }
    }

    #[test]
    fn hardened_rejects_structural_problems() {
        let cases: Vec<(Header, DescriptorError)> = vec![
            (
                Header {
                    header_size: 8,
                    ..sample()
                },
                DescriptorError::HeaderSize(8),
            ),
            (
                Header {
                    header_size: 4096,
                    ..sample()
                },
                DescriptorError::HeaderSize(4096),
            ),
            (
                Header {
                    version: 0,
                    ..sample()
                },
                DescriptorError::UnsupportedVersion(0),
            ),
            (
                Header {
                    flags: FLAG_SORTED | 0x80,
                    ..sample()
                },
                DescriptorError::ReservedFlags(0x80),
            ),
            (
                Header {
                    data_alignment: 6,
                    ..sample()
                },
                DescriptorError::Alignment(6),
            ),
            (
                Header {
                    data_alignment: 0,
                    ..sample()
                },
                DescriptorError::Alignment(0),
            ),
        ];
        for (h, want) in cases {
            let mut bytes = h.encode().to_vec();
            bytes.resize(512, 0);
            assert_eq!(parse_header(&bytes, Validation::Hardened).unwrap_err(), want);
            assert!(parse_header(&bytes, Validation::Trusting).is_ok());
        }
    }

    #[test]
    fn hardened_rejects_entry_table_past_the_end() {
        let h = sample();
        let bytes = h.encode().to_vec();
        assert_eq!(
            parse_header(&bytes, Validation::Hardened).unwrap_err(),
            DescriptorError::EntryTableTruncated { need: 40, have: 16 }
        );
    }

    #[test]
    fn larger_headers_are_accepted() {
        let h = Header {
            header_size: 24,
            ..sample()
        };
        let mut bytes = h.encode().to_vec();
        bytes.resize(24 + 3 * 8, 0xEE);
        assert_eq!(parse_header(&bytes, Validation::Hardened).unwrap(), h);
    }
}
