//! The default violation handler: one `CVABI_VIOLATION_V1 {json}` line on
//! stderr.

use std::io::Write;

use cvabi_contracts::CVABI_VIOLATION_PAYLOAD_PREFIX;
use cvabi_descriptor::{FieldId, FieldValue, TlvReader};
use serde::Serialize;

use crate::ViolationView;

/// Fields whose pointer value addresses a NUL-terminated string.
const TEXT_FIELDS: [FieldId; 3] = [FieldId::COMMENT, FieldId::FILE_NAME, FieldId::FUNCTION_NAME];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PayloadValue {
    Pointer(String),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(String),
}

impl PayloadValue {
    fn from_field(v: &FieldValue<'_>) -> Self {
        match *v {
            FieldValue::Pointer(p) => PayloadValue::Pointer(format!("{p:#x}")),
            FieldValue::U8(v) => PayloadValue::U8(v),
            FieldValue::U16(v) => PayloadValue::U16(v),
            FieldValue::U32(v) => PayloadValue::U32(v),
            FieldValue::U64(v) => PayloadValue::U64(v),
            FieldValue::Bytes(b) => PayloadValue::Bytes(hex(b)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadField {
    #[serde(skip)]
    pub field: FieldId,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: &'static str,
    pub value: PayloadValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationPayload {
    pub detection_mode: String,
    pub semantic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u8>,
    pub fields: Vec<PayloadField>,
    pub dynamic_truncated: bool,
}

impl ViolationPayload {
    /// Collects every resolvable static field (table order) followed by the
    /// dynamic records not already supplied statically. Pointers are never
    /// dereferenced here.
    pub fn from_view(view: &ViolationView<'_>) -> Self {
        let mut fields = Vec::new();
        let resolver = view.resolver();

        for f in view.static_fields() {
            fields.push(PayloadField {
                field: f.id,
                id: f.id.to_string(),
                name: resolver.and_then(|r| r.vendors().name_of(f.id)).map(str::to_string),
                source: "static",
                value: PayloadValue::from_field(&f.value),
                text: None,
            });
        }

        let mut dynamic_truncated = false;
        if let Some(stream) = view.dynamic_stream() {
            let mut seen: Vec<FieldId> = fields.iter().map(|f| f.field).collect();
            let mut reader = TlvReader::new(stream);
            for rec in reader.by_ref() {
                if seen.contains(&rec.id) {
                    continue;
                }
                seen.push(rec.id);
                let Some(value) = view.get_dynamic(rec.id) else {
                    continue;
                };
                let text = match value {
                    FieldValue::Bytes(b) if TEXT_FIELDS.contains(&rec.id) => {
                        Some(String::from_utf8_lossy(trim_nul(b)).into_owned())
                    }
                    _ => None,
                };
                fields.push(PayloadField {
                    field: rec.id,
                    id: rec.id.to_string(),
                    name: cvabi_descriptor::standard_field(rec.id)
                        .map(|f| f.name.to_string())
                        .or_else(|| {
                            resolver
                                .and_then(|r| r.vendors().name_of(rec.id))
                                .map(str::to_string)
                        }),
                    source: "dynamic",
                    value: PayloadValue::from_field(&value),
                    text,
                });
            }
            dynamic_truncated = reader.truncated();
        }

        Self {
            detection_mode: view.detection_mode().to_string(),
            semantic: view.semantic().to_string(),
            vendor_id: view.vendor_id(),
            fields,
            dynamic_truncated,
        }
    }

    /// Fills `text` for static string-valued pointer fields using `read`.
    pub fn with_text(
        mut self,
        view: &ViolationView<'_>,
        read: impl Fn(usize) -> Option<String>,
    ) -> Self {
        for f in self.fields.iter_mut() {
            if f.source != "static" || !TEXT_FIELDS.contains(&f.field) {
                continue;
            }
            let addr = view
                .get_static(f.field)
                .and_then(|r| r.value.as_pointer())
                .unwrap_or(0);
            if addr != 0 {
                f.text = read(addr);
            }
        }
        self
    }

    pub fn to_line(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("{CVABI_VIOLATION_PAYLOAD_PREFIX}{json}")
    }
}

fn trim_nul(b: &[u8]) -> &[u8] {
    match b.iter().position(|&c| c == 0) {
        Some(end) => &b[..end],
        None => b,
    }
}

fn hex(b: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(b.len() * 2);
    for byte in b {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Writes the payload line for `view` to `out`.
pub fn write_violation(out: &mut dyn Write, payload: &ViolationPayload) -> std::io::Result<()> {
    writeln!(out, "{}", payload.to_line())
}

/// Handler used when none is installed.
pub fn default_handler(view: &ViolationView<'_>) {
    let payload = ViolationPayload::from_view(view).with_text(view, |addr| {
        // SAFETY: static string fields point at NUL-terminated strings in the
        // producer's read-only data.
        unsafe { crate::ffi::read_c_string(addr) }
    });
    let stderr = std::io::stderr();
    let mut lock = stderr.lock();
    let _ = write_violation(&mut lock, &payload);
    let _ = lock.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DetectionMode, EvaluationSemantic};
    use cvabi_descriptor::{
        Descriptor, DescriptorBuilder, FieldKind, Resolver, TableCatalog, TlvWriter, Validation,
        VendorRegistry,
    };

    #[test]
    fn payload_lists_static_then_dynamic_fields() {
        let built = DescriptorBuilder::new(4)
            .pointer(FieldId::COMMENT, 0x1000)
            .u32(FieldId::LINE, 42)
            .u8(FieldId::vendor(4, 2), 9)
            .build()
            .unwrap();
        let mut vendors = VendorRegistry::new();
        vendors.register(4, TableCatalog::new().with_field(2, "level", FieldKind::U8));
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();

        let mut w = TlvWriter::new();
        w.push(FieldId::LINE, &1u32.to_ne_bytes()).unwrap();
        w.push(FieldId::FILE_NAME, b"src/main.cc\0").unwrap();
        let tlv = w.finish();

        let view = ViolationView::new(
            Some(Resolver::new(d, built.data.as_slice(), &vendors)),
            DetectionMode::PredicateFalse,
            EvaluationSemantic::Observe,
        )
        .with_dynamic(&tlv);

        let p = ViolationPayload::from_view(&view);
        assert_eq!(p.vendor_id, Some(4));
        assert_eq!(p.semantic, "observe");
        let ids: Vec<_> = p.fields.iter().map(|f| (f.id.as_str(), f.source)).collect();
        assert_eq!(
            ids,
            [
                ("0x0001", "static"),
                ("0x0004", "static"),
                ("0x8402", "static"),
                ("0x0002", "dynamic"),
            ]
        );
        assert_eq!(p.fields[2].name.as_deref(), Some("level"));
        assert_eq!(p.fields[3].text.as_deref(), Some("src/main.cc"));
        assert!(!p.dynamic_truncated);

        let p = p.with_text(&view, |addr| (addr == 0x1000).then(|| "x > 0".to_string()));
        assert_eq!(p.fields[0].text.as_deref(), Some("x > 0"));
    }

    #[test]
    fn line_has_the_stable_prefix_and_parses_as_json() {
        let view = ViolationView::new(
            None,
            DetectionMode::Unknown(7),
            EvaluationSemantic::Enforce,
        );
        let p = ViolationPayload::from_view(&view);
        let mut out = Vec::new();
        write_violation(&mut out, &p).unwrap();
        let line = String::from_utf8(out).unwrap();
        let json = line
            .trim_end()
            .strip_prefix(CVABI_VIOLATION_PAYLOAD_PREFIX)
            .expect("prefix");
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["detection_mode"], "unknown(7)");
        assert_eq!(v["semantic"], "enforce");
        assert_eq!(v["fields"].as_array().map(Vec::len), Some(0));
        assert!(v.get("vendor_id").is_none());
    }

    #[test]
    fn values_serialize_with_kind_tags() {
        let v =
            serde_json::to_value(PayloadValue::from_field(&FieldValue::Pointer(0xbeef))).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "pointer", "value": "0xbeef"}));
        let bytes = PayloadValue::from_field(&FieldValue::Bytes(&[1, 0xab]));
        let v = serde_json::to_value(bytes).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "bytes", "value": "01ab"}));
    }
}
