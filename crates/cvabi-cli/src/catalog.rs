//! Vendor catalog files (`cvabi.vendor_catalog@0.1.0`).

use std::path::Path;

use anyhow::{Context, Result};
use cvabi_contracts::CVABI_VENDOR_CATALOG_SCHEMA_VERSION;
use cvabi_descriptor::{FieldKind, TableCatalog, VendorRegistry};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    schema_version: String,
    vendors: Vec<VendorDecl>,
}

#[derive(Debug, Deserialize)]
struct VendorDecl {
    vendor_id: u8,
    fields: Vec<VendorFieldDecl>,
}

#[derive(Debug, Deserialize)]
struct VendorFieldDecl {
    local_id: u8,
    name: String,
    kind: String,
}

pub fn parse_catalog(bytes: &[u8]) -> Result<VendorRegistry> {
    let file: CatalogFile = serde_json::from_slice(bytes).context("parse vendor catalog JSON")?;
    if file.schema_version.trim() != CVABI_VENDOR_CATALOG_SCHEMA_VERSION {
        anyhow::bail!(
            "vendor catalog schema_version mismatch: expected {CVABI_VENDOR_CATALOG_SCHEMA_VERSION} got {:?}",
            file.schema_version
        );
    }

    let mut registry = VendorRegistry::new();
    for (idx, v) in file.vendors.iter().enumerate() {
        if v.vendor_id > 0x7F {
            anyhow::bail!("vendors[{idx}]: vendor_id {} does not fit in 7 bits", v.vendor_id);
        }
        let mut catalog = TableCatalog::new();
        for (fidx, f) in v.fields.iter().enumerate() {
            let kind: FieldKind = f
                .kind
                .parse()
                .with_context(|| format!("vendors[{idx}].fields[{fidx}]"))?;
            catalog = catalog.with_field(f.local_id, f.name.clone(), kind);
        }
        registry.register(v.vendor_id, catalog);
    }
    Ok(registry)
}

pub fn load_catalog(path: Option<&Path>) -> Result<VendorRegistry> {
    let Some(path) = path else {
        return Ok(VendorRegistry::new());
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("read vendor catalog: {}", path.display()))?;
    parse_catalog(&bytes).with_context(|| format!("vendor catalog: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvabi_descriptor::FieldId;

    #[test]
    fn catalog_registers_vendor_fields() {
        let json = br#"{
            "schema_version": "cvabi.vendor_catalog@0.1.0",
            "vendors": [{"vendor_id": 2, "fields": [{"local_id": 3, "name": "flag", "kind": "u8"}]}]
        }"#;
        let reg = parse_catalog(json).unwrap();
        assert_eq!(reg.kind_of(FieldId::vendor(2, 3), 2), Some(FieldKind::U8));
        assert_eq!(reg.name_of(FieldId::vendor(2, 3)), Some("flag"));
        assert_eq!(reg.kind_of(FieldId::vendor(2, 3), 1), None);
    }

    #[test]
    fn catalog_rejects_wrong_schema_and_kinds() {
        let err = parse_catalog(br#"{"schema_version": "x@1", "vendors": []}"#).unwrap_err();
        assert!(format!("{err:#}").contains("schema_version mismatch"));

        let bad_kind = br#"{
            "schema_version": "cvabi.vendor_catalog@0.1.0",
            "vendors": [{"vendor_id": 2, "fields": [{"local_id": 1, "name": "f", "kind": "f32"}]}]
        }"#;
        assert!(parse_catalog(bad_kind).is_err());
    }
}
