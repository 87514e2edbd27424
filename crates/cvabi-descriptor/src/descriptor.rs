use tracing::debug;

use crate::{
    parse_header, DescriptorError, Entry, EntryTable, FieldId, Header, Index, Result, Validation,
};

/// A parsed, borrowed descriptor: header, entry table and optional index.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor<'a> {
    header: Header,
    table: EntryTable<'a>,
    index: Option<Index<'a>>,
}

impl<'a> Descriptor<'a> {
    /// Parses `bytes` as a descriptor.
    ///
    /// Under [`Validation::Hardened`] the header, sort order and index are
    /// checked and any inconsistency is an error. Under
    /// [`Validation::Trusting`] a short entry table is truncated to what is
    /// present and an unreadable index is ignored.
    pub fn parse(bytes: &'a [u8], mode: Validation) -> Result<Self> {
        let header = parse_header(bytes, mode)?;

        let start = (header.header_size as usize).min(bytes.len());
        let table = EntryTable::new(
            &bytes[start..],
            header.num_entries as usize,
            header.is_sorted(),
        );

        if mode.is_hardened() && header.is_sorted() {
            if let Some(position) = table.first_unsorted() {
                let field = table.get(position).map(|e| e.field.to_string());
                return Err(DescriptorError::Unsorted {
                    position,
                    field: field.unwrap_or_default(),
                });
            }
        }

        let index = if header.has_index() {
            let parsed = header
                .entries_end()
                .and_then(Index::section_offset)
                .and_then(|off| Index::parse(bytes, off));
            match parsed {
                Some(index) => {
                    if mode.is_hardened() {
                        index.validate(&table, header.num_entries)?;
                    }
                    Some(index)
                }
                None if mode.is_hardened() => return Err(DescriptorError::IndexTruncated),
                None => {
                    debug!("descriptor index flag set but section unreadable; ignoring index");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            header,
            table,
            index,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn entries(&self) -> &EntryTable<'a> {
        &self.table
    }

    pub fn index(&self) -> Option<&Index<'a>> {
        self.index.as_ref()
    }

    /// First entry for `field`, narrowed through the index when present.
    ///
    /// An index miss falls back to the direct lookup, so the result always
    /// equals [`Descriptor::find_direct`] for a descriptor that passes
    /// hardened validation.
    pub fn find(&self, field: FieldId) -> Option<Entry> {
        if let Some(index) = &self.index {
            if let Some(record) = index.lookup(field) {
                if let Some((_, e)) = self.table.find_in(record.range(), field) {
                    return Some(e);
                }
            }
        }
        self.find_direct(field)
    }

    /// First entry for `field` without consulting the index.
    pub fn find_direct(&self, field: FieldId) -> Option<Entry> {
        self.table.find(field).map(|(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DescriptorBuilder;

    #[test]
    fn parses_built_descriptor_with_index() {
        let built = DescriptorBuilder::new(2)
            .sorted(true)
            .with_index(true)
            .u32(FieldId::LINE, 42)
            .u8(FieldId::ASSERTION_KIND, 1)
            .u32(FieldId::COLUMN, 7)
            .build()
            .unwrap();
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();
        assert!(d.header().is_sorted());
        assert_eq!(d.index().map(|i| i.len()), Some(3));
        for id in [FieldId::LINE, FieldId::COLUMN, FieldId::ASSERTION_KIND] {
            assert!(d.find(id).is_some());
            assert_eq!(d.find(id), d.find_direct(id));
        }
        assert_eq!(d.find(FieldId::COMMENT), None);
    }

    #[test]
    fn hardened_rejects_mislabelled_sort_order() {
        let built = DescriptorBuilder::new(0)
            .sorted(false)
            .u32(FieldId::LINE, 1)
            .u32(FieldId::COMMENT, 2)
            .build()
            .unwrap();
        let mut bytes = built.descriptor.clone();
        bytes[2] |= cvabi_contracts::FLAG_SORTED;
        assert!(matches!(
            Descriptor::parse(&bytes, Validation::Hardened),
            Err(DescriptorError::Unsorted { position: 1, .. })
        ));
        assert!(Descriptor::parse(&bytes, Validation::Trusting).is_ok());
    }

    #[test]
    fn trusting_ignores_a_truncated_index() {
        let built = DescriptorBuilder::new(0)
            .sorted(true)
            .with_index(true)
            .u32(FieldId::LINE, 1)
            .build()
            .unwrap();
        let cut = &built.descriptor[..built.descriptor.len() - 2];
        assert_eq!(
            Descriptor::parse(cut, Validation::Hardened).unwrap_err(),
            DescriptorError::IndexTruncated
        );
        let d = Descriptor::parse(cut, Validation::Trusting).unwrap();
        assert!(d.index().is_none());
        assert!(d.find(FieldId::LINE).is_some());
    }
}
