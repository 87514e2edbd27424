use std::path::Path;
use std::process::Command;

use cvabi_contracts::{CVABI_INSPECT_REPORT_SCHEMA_VERSION, CVABI_LAYOUT_SCHEMA_VERSION};
use serde_json::Value;

fn run_cvabi(args: &[&str]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_cvabi");
    Command::new(exe).args(args).output().expect("run cvabi")
}

fn path_str(p: &Path) -> &str {
    p.to_str().expect("utf-8 path")
}

fn write_manifest(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("layout.json");
    std::fs::write(&path, body).expect("write manifest");
    path
}

fn build(dir: &Path, manifest: &Path) -> std::process::Output {
    run_cvabi(&[
        "build",
        "--manifest",
        path_str(manifest),
        "--descriptor-out",
        path_str(&dir.join("out/desc.bin")),
        "--data-out",
        path_str(&dir.join("out/data.bin")),
        "--tlv-out",
        path_str(&dir.join("out/dyn.bin")),
    ])
}

#[test]
fn build_then_inspect_roundtrips_through_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(
        tmp.path(),
        &format!(
            r#"{{
                "schema_version": "{CVABI_LAYOUT_SCHEMA_VERSION}",
                "vendor_id": 2,
                "sorted": true,
                "index": true,
                "fields": [
                    {{"id": "0x0004", "value": 17}},
                    {{"id": "0x0011", "value": 1}},
                    {{"id": "0x8203", "kind": "u8", "value": 1}}
                ],
                "dynamic": [{{"id": "0x0005", "value": 3}}]
            }}"#
        ),
    );
    let out = build(tmp.path(), &manifest);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );

    let catalog = tmp.path().join("vendors.json");
    std::fs::write(
        &catalog,
        r#"{"schema_version": "cvabi.vendor_catalog@0.1.0",
            "vendors": [{"vendor_id": 2, "fields": [{"local_id": 3, "name": "flag", "kind": "u8"}]}]}"#,
    )
    .expect("write catalog");

    let out = run_cvabi(&[
        "inspect",
        "--descriptor",
        path_str(&tmp.path().join("out/desc.bin")),
        "--data",
        path_str(&tmp.path().join("out/data.bin")),
        "--tlv",
        path_str(&tmp.path().join("out/dyn.bin")),
        "--vendor-catalog",
        path_str(&catalog),
        "--json",
    ]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: Value = serde_json::from_slice(&out.stdout).expect("parse stdout JSON");
    assert_eq!(v["schema_version"], CVABI_INSPECT_REPORT_SCHEMA_VERSION);
    assert_eq!(v["header"]["vendor_id"], 2);
    assert_eq!(v["header"]["num_entries"], 3);
    assert_eq!(v["header"]["has_index"], true);

    let fields = v["violation"]["fields"].as_array().expect("fields[]");
    let ids: Vec<&str> = fields
        .iter()
        .map(|f| f["id"].as_str().expect("field.id"))
        .collect();
    assert_eq!(ids, vec!["0x0004", "0x0011", "0x8203", "0x0005"]);
    assert_eq!(fields[0]["value"]["value"], 17);
    assert_eq!(fields[2]["name"], "flag");
    assert_eq!(fields[3]["source"], "dynamic");
}

#[test]
fn inspect_rejects_malformed_descriptor_when_hardened() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = tmp.path().join("desc.bin");
    // version 0, header_size 16, no entries.
    let mut bytes = vec![0u8; 16];
    bytes[6..8].copy_from_slice(&16u16.to_ne_bytes());
    bytes[12] = 1;
    std::fs::write(&desc, &bytes).expect("write descriptor");

    let out = run_cvabi(&["inspect", "--descriptor", path_str(&desc), "--json"]);
    assert_ne!(out.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("parse descriptor"), "stderr:\n{stderr}");

    let out = run_cvabi(&[
        "inspect",
        "--descriptor",
        path_str(&desc),
        "--validation",
        "trusting",
        "--json",
    ]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: Value = serde_json::from_slice(&out.stdout).expect("parse stdout JSON");
    assert_eq!(v["validation"], "trusting");
    assert_eq!(v["header"]["version"], 0);
}

#[test]
fn build_rejects_unknown_schema_version() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(
        tmp.path(),
        r#"{"schema_version": "cvabi.layout@9.9.9", "vendor_id": 0}"#,
    );
    let out = build(tmp.path(), &manifest);
    assert_ne!(out.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("schema_version mismatch"), "stderr:\n{stderr}");
}
