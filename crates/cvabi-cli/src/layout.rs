//! Layout manifests (`cvabi.layout@0.1.0`) and the `build` command.

use std::path::Path;

use anyhow::{Context, Result};
use cvabi_contracts::CVABI_LAYOUT_SCHEMA_VERSION;
use cvabi_descriptor::{
    standard_field, BuiltDescriptor, DescriptorBuilder, FieldId, FieldKind, TlvWriter,
};
use serde::Deserialize;

use crate::literal::IntLiteral;

#[derive(Debug, Deserialize)]
pub struct LayoutManifest {
    pub schema_version: String,
    pub vendor_id: u8,
    #[serde(default)]
    pub version: Option<u8>,
    #[serde(default)]
    pub sorted: bool,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub alignment: Option<u8>,
    #[serde(default)]
    pub fields: Vec<LayoutField>,
    /// Records for the dynamic TLV stream.
    #[serde(default)]
    pub dynamic: Vec<DynamicRecord>,
}

#[derive(Debug, Deserialize)]
pub struct LayoutField {
    pub id: IntLiteral,
    /// Required unless `id` is a standard field.
    #[serde(default)]
    pub kind: Option<String>,
    pub value: IntLiteral,
}

#[derive(Debug, Deserialize)]
pub struct DynamicRecord {
    pub id: IntLiteral,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<IntLiteral>,
    /// UTF-8 payload, written with a trailing NUL.
    #[serde(default)]
    pub text: Option<String>,
}

fn field_kind(id: FieldId, kind: Option<&str>, what: &str) -> Result<FieldKind> {
    if let Some(k) = kind {
        return k.parse::<FieldKind>().with_context(|| what.to_string());
    }
    standard_field(id)
        .map(|f| f.kind)
        .with_context(|| format!("{what}: kind is required for non-standard field {id}"))
}

fn encode_value(kind: FieldKind, v: u64, what: &str) -> Result<Vec<u8>> {
    let fits = match kind {
        FieldKind::U8 => v <= u8::MAX as u64,
        FieldKind::U16 => v <= u16::MAX as u64,
        FieldKind::U32 => v <= u32::MAX as u64,
        FieldKind::U64 => true,
        FieldKind::Pointer => usize::try_from(v).is_ok(),
    };
    if !fits {
        anyhow::bail!("{what}: value {v:#x} does not fit in {kind}");
    }
    Ok(match kind {
        FieldKind::U8 => vec![v as u8],
        FieldKind::U16 => (v as u16).to_ne_bytes().to_vec(),
        FieldKind::U32 => (v as u32).to_ne_bytes().to_vec(),
        FieldKind::U64 => v.to_ne_bytes().to_vec(),
        FieldKind::Pointer => (v as usize).to_ne_bytes().to_vec(),
    })
}

impl LayoutManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let m: LayoutManifest =
            serde_json::from_slice(bytes).context("parse layout manifest JSON")?;
        if m.schema_version.trim() != CVABI_LAYOUT_SCHEMA_VERSION {
            anyhow::bail!(
                "layout manifest schema_version mismatch: expected {CVABI_LAYOUT_SCHEMA_VERSION} got {:?}",
                m.schema_version
            );
        }
        Ok(m)
    }

    pub fn builder(&self) -> Result<DescriptorBuilder> {
        let mut b = DescriptorBuilder::new(self.vendor_id)
            .sorted(self.sorted)
            .with_index(self.index);
        if let Some(v) = self.version {
            b = b.version(v);
        }
        if let Some(a) = self.alignment {
            b = b.alignment(a);
        }
        for (idx, f) in self.fields.iter().enumerate() {
            let what = format!("fields[{idx}]");
            let id = f.id.field_id().with_context(|| what.clone())?;
            let kind = field_kind(id, f.kind.as_deref(), &what)?;
            let value = f.value.value().with_context(|| what.clone())?;
            encode_value(kind, value, &what)?;
            b = b.value(id, kind, value);
        }
        Ok(b)
    }

    pub fn build(&self) -> Result<BuiltDescriptor> {
        let built = self.builder()?.build()?;
        Ok(built)
    }

    /// The terminated TLV stream, or `None` when the manifest has no
    /// dynamic records.
    pub fn dynamic_stream(&self) -> Result<Option<Vec<u8>>> {
        if self.dynamic.is_empty() {
            return Ok(None);
        }
        let mut w = TlvWriter::new();
        for (idx, r) in self.dynamic.iter().enumerate() {
            let what = format!("dynamic[{idx}]");
            let id = r.id.field_id().with_context(|| what.clone())?;
            let payload = match (&r.text, &r.value) {
                (Some(text), None) => {
                    let mut p = text.as_bytes().to_vec();
                    p.push(0);
                    p
                }
                (None, Some(v)) => {
                    let kind = field_kind(id, r.kind.as_deref(), &what)?;
                    encode_value(kind, v.value().with_context(|| what.clone())?, &what)?
                }
                _ => anyhow::bail!("{what}: exactly one of `text` or `value` is required"),
            };
            w.push(id, &payload).with_context(|| what.clone())?;
        }
        Ok(Some(w.finish()))
    }
}

pub struct BuildOutputs<'a> {
    pub descriptor: &'a Path,
    pub data: &'a Path,
    pub tlv: Option<&'a Path>,
}

pub fn run_build(manifest_path: &Path, out: BuildOutputs<'_>) -> Result<()> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("read layout manifest: {}", manifest_path.display()))?;
    let m = LayoutManifest::parse(&bytes)
        .with_context(|| format!("layout manifest: {}", manifest_path.display()))?;
    let built = m
        .build()
        .with_context(|| format!("build descriptor: {}", manifest_path.display()))?;

    write_file(out.descriptor, &built.descriptor)?;
    write_file(out.data, built.data.as_slice())?;
    match (out.tlv, m.dynamic_stream()?) {
        (Some(path), Some(stream)) => write_file(path, &stream)?,
        (Some(path), None) => write_file(path, &TlvWriter::new().finish())?,
        (None, Some(_)) => {
            tracing::warn!("manifest has dynamic records but no --tlv-out was given");
        }
        (None, None) => {}
    }
    tracing::debug!(
        entries = built.header.num_entries,
        data_size = built.header.data_size,
        "descriptor written"
    );
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write output: {}", path.display()))
}
