#![cfg(feature = "cli")]

mod common;

use std::process::Command;

use pkgdelta::archive::compression::PayloadCompression;
use pkgdelta::archive::{PackageArchive, PackageFile};
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_pkgdelta").to_string()
}

#[test]
fn cli_create_then_inspect() {
    let dir = tempdir().unwrap();
    let (old, new) = common::nano_pair(dir.path(), &PayloadCompression::None);
    let out_dir = dir.path().join("deltas");

    let out = Command::new(bin())
        .arg("create")
        .arg("--output-dir")
        .arg(&out_dir)
        .arg(&old)
        .arg(&new)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let printed = String::from_utf8(out.stdout).unwrap();
    let path = std::path::PathBuf::from(printed.trim());
    assert_eq!(path, out_dir.join("nano-117-118-x86_64.delta"));
    let delta = PackageFile::open(&path).unwrap();
    assert_eq!(delta.metadata().release, 118);

    let out = Command::new(bin())
        .args(["inspect", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["metadata"]["name"], "nano");
    assert_eq!(json["metadata"]["release"], 118);
    assert_eq!(json["delta"]["base_release"], 117);
    assert_eq!(json["entries"].as_array().unwrap().len(), 4);
}

#[test]
fn cli_create_json_stats() {
    let dir = tempdir().unwrap();
    let (old, new) = common::nano_pair(dir.path(), &PayloadCompression::None);

    let out = Command::new(bin())
        .args(["--json", "create", "--output-dir"])
        .arg(dir.path())
        .arg(&old)
        .arg(&new)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["base_release"], 117);
    assert_eq!(json["target_release"], 118);
    assert_eq!(json["added"], 1);
    assert_eq!(json["removed"], 1);
}

#[test]
fn cli_rejects_backwards_delta() {
    let dir = tempdir().unwrap();
    let (old, new) = common::nano_pair(dir.path(), &PayloadCompression::None);

    let out = Command::new(bin())
        .arg("create")
        .arg("--output-dir")
        .arg(dir.path())
        .arg(&new)
        .arg(&old)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("does not follow"));
}

#[test]
fn cli_inspect_missing_file_fails() {
    let dir = tempdir().unwrap();
    let st = Command::new(bin())
        .arg("inspect")
        .arg(dir.path().join("bob"))
        .status()
        .unwrap();
    assert!(!st.success());
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
}
