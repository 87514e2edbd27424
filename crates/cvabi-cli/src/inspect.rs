//! The `inspect` command: decode a descriptor, its data blob and an optional
//! dynamic stream into a report.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use cvabi_contracts::CVABI_INSPECT_REPORT_SCHEMA_VERSION;
use cvabi_descriptor::{
    AlignedBytes, Descriptor, FieldId, FieldRange, Resolver, TlvReader, Validation,
    VendorRegistry,
};
use cvabi_runtime::handler::ViolationPayload;
use cvabi_runtime::{DetectionMode, EvaluationSemantic, ViolationView};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HeaderReport {
    pub version: u8,
    pub vendor_id: u8,
    pub flags: u8,
    pub sorted: bool,
    pub has_index: bool,
    pub num_entries: u16,
    pub header_size: u16,
    pub data_size: u32,
    pub data_alignment: u8,
}

#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub position: usize,
    pub id: String,
    pub range: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<u8>,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct IndexRecordReport {
    pub key: String,
    pub start: u16,
    pub count: u16,
}

#[derive(Debug, Serialize)]
pub struct TlvRecordReport {
    pub id: String,
    pub len: usize,
}

#[derive(Debug, Serialize)]
pub struct DynamicReport {
    pub records: Vec<TlvRecordReport>,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub schema_version: &'static str,
    pub validation: &'static str,
    pub descriptor_len: usize,
    pub data_len: usize,
    pub header: HeaderReport,
    pub entries: Vec<EntryReport>,
    pub index: Option<Vec<IndexRecordReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicReport>,
    pub violation: ViolationPayload,
}

pub struct InspectInputs<'a> {
    pub descriptor: &'a [u8],
    pub data: &'a [u8],
    pub tlv: Option<&'a [u8]>,
    pub validation: Validation,
    pub vendors: &'a VendorRegistry,
    pub detection: DetectionMode,
    pub semantic: EvaluationSemantic,
}

fn entry_report(position: usize, field: FieldId, offset: u32) -> EntryReport {
    let (range, vendor, local_id) = match field.range() {
        FieldRange::Invalid => ("invalid", None, None),
        FieldRange::Standard => ("standard", None, None),
        FieldRange::FutureStandard => ("future_standard", None, None),
        FieldRange::Vendor { vendor, local_id } => ("vendor", Some(vendor), Some(local_id)),
    };
    EntryReport {
        position,
        id: field.to_string(),
        range,
        vendor,
        local_id,
        offset,
    }
}

pub fn inspect(inputs: &InspectInputs<'_>) -> Result<InspectReport> {
    let d = Descriptor::parse(inputs.descriptor, inputs.validation)
        .with_context(|| format!("parse descriptor ({} validation)", inputs.validation))?;
    let h = d.header();

    let entries = d
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| entry_report(i, e.field, e.offset))
        .collect();
    let index = d.index().map(|ix| {
        ix.iter()
            .map(|r| IndexRecordReport {
                key: r.key.to_string(),
                start: r.start,
                count: r.count,
            })
            .collect()
    });
    let dynamic = inputs.tlv.map(|buf| {
        let mut reader = TlvReader::new(buf);
        let records = reader
            .by_ref()
            .map(|r| TlvRecordReport {
                id: r.id.to_string(),
                len: r.payload.len(),
            })
            .collect();
        DynamicReport {
            records,
            truncated: reader.truncated(),
        }
    });

    let mut view = ViolationView::new(
        Some(Resolver::new(d, inputs.data, inputs.vendors)),
        inputs.detection,
        inputs.semantic,
    );
    if let Some(tlv) = inputs.tlv {
        view = view.with_dynamic(tlv);
    }

    Ok(InspectReport {
        schema_version: CVABI_INSPECT_REPORT_SCHEMA_VERSION,
        validation: inputs.validation.as_str(),
        descriptor_len: inputs.descriptor.len(),
        data_len: inputs.data.len(),
        header: HeaderReport {
            version: h.version,
            vendor_id: h.vendor_id,
            flags: h.flags,
            sorted: h.is_sorted(),
            has_index: h.has_index(),
            num_entries: h.num_entries,
            header_size: h.header_size,
            data_size: h.data_size,
            data_alignment: h.data_alignment,
        },
        entries,
        index,
        dynamic,
        violation: ViolationPayload::from_view(&view),
    })
}

/// Human-readable rendering of a report.
pub fn render_text(r: &InspectReport) -> String {
    let mut out = String::new();
    let h = &r.header;
    let _ = writeln!(
        out,
        "descriptor: version {} vendor {} entries {} header_size {} data_size {} alignment {}{}{}",
        h.version,
        h.vendor_id,
        h.num_entries,
        h.header_size,
        h.data_size,
        h.data_alignment,
        if h.sorted { " sorted" } else { "" },
        if h.has_index { " indexed" } else { "" },
    );
    for e in &r.entries {
        let _ = writeln!(out, "  [{}] {} {} @{}", e.position, e.id, e.range, e.offset);
    }
    if let Some(index) = &r.index {
        for rec in index {
            let _ = writeln!(out, "  index {} -> {}+{}", rec.key, rec.start, rec.count);
        }
    }
    for f in &r.violation.fields {
        let value = serde_json::to_string(&f.value).unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} {} {} {}",
            f.source,
            f.id,
            f.name.as_deref().unwrap_or("-"),
            value
        );
    }
    if let Some(d) = &r.dynamic {
        let _ = writeln!(
            out,
            "dynamic: {} records{}",
            d.records.len(),
            if d.truncated { " (truncated)" } else { "" }
        );
    }
    out
}

pub fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {what}: {}", path.display()))
}

/// Loads a data blob into 8-byte aligned storage so the declared alignment
/// holds for the base address as well.
pub fn read_data(path: Option<&Path>) -> Result<AlignedBytes> {
    match path {
        Some(p) => Ok(AlignedBytes::from_slice(&read_input(p, "data blob")?)),
        None => Ok(AlignedBytes::zeroed(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvabi_descriptor::{DescriptorBuilder, FieldKind, TableCatalog, TlvWriter};

    fn inputs<'a>(
        descriptor: &'a [u8],
        data: &'a [u8],
        tlv: Option<&'a [u8]>,
        vendors: &'a VendorRegistry,
    ) -> InspectInputs<'a> {
        InspectInputs {
            descriptor,
            data,
            tlv,
            validation: Validation::Hardened,
            vendors,
            detection: DetectionMode::PredicateFalse,
            semantic: EvaluationSemantic::Enforce,
        }
    }

    #[test]
    fn report_covers_entries_index_and_fields() {
        let built = DescriptorBuilder::new(2)
            .sorted(true)
            .with_index(true)
            .u32(FieldId::LINE, 9)
            .u8(FieldId::vendor(2, 3), 1)
            .build()
            .unwrap();
        let mut vendors = VendorRegistry::new();
        vendors.register(2, TableCatalog::new().with_field(3, "flag", FieldKind::U8));
        let mut w = TlvWriter::new();
        w.push(FieldId::COLUMN, &4u32.to_ne_bytes()).unwrap();
        let tlv = w.finish();

        let r = inspect(&inputs(
            &built.descriptor,
            built.data.as_slice(),
            Some(&tlv),
            &vendors,
        ))
        .unwrap();
        assert_eq!(r.header.num_entries, 2);
        assert_eq!(r.entries[1].range, "vendor");
        assert_eq!(r.entries[1].vendor, Some(2));
        assert_eq!(r.index.as_ref().map(Vec::len), Some(2));
        assert_eq!(r.violation.fields.len(), 3);
        assert_eq!(r.dynamic.as_ref().map(|d| d.records.len()), Some(1));

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["schema_version"], CVABI_INSPECT_REPORT_SCHEMA_VERSION);
        assert_eq!(v["entries"][0]["id"], "0x0004");
        assert!(render_text(&r).contains("0x8203 vendor"));
    }

    #[test]
    fn hardened_parse_errors_are_reported_with_context() {
        let mut bytes = DescriptorBuilder::new(0)
            .u32(FieldId::LINE, 1)
            .build()
            .unwrap()
            .descriptor;
        bytes[0] = 0;
        let vendors = VendorRegistry::new();
        let err = inspect(&inputs(&bytes, &[], None, &vendors)).unwrap_err();
        assert!(format!("{err:#}").contains("hardened"));
    }
}
