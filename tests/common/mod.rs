// Shared fixtures: small `nano` packages built on the fly.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pkgdelta::archive::compression::PayloadCompression;
use pkgdelta::archive::{AtomicFile, PackageMeta, PackageWriter};

pub const OLD_PKG: &str = "nano-4.6-117-1-x86_64.pkg";
pub const NEW_PKG: &str = "nano-4.7-118-1-x86_64.pkg";

pub fn nano_meta(version: &str, release: u64) -> PackageMeta {
    let mut meta = PackageMeta::new("nano", version, release, "x86_64");
    meta.summary = "Small, friendly text editor inspired by Pico".into();
    meta.description = "GNU nano is an easy-to-use text editor originally designed as a \
                        replacement for Pico."
        .into();
    meta.homepage = Some("https://www.nano-editor.org/".into());
    meta.license = Some("GPL-3.0-or-later".into());
    meta.dependencies = vec!["glibc".into(), "ncurses".into()];
    meta.extra.insert("component".into(), serde_json::json!("system.devel"));
    meta
}

pub fn old_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("usr/bin/nano".into(), binary(b"nano 4.6", 8192)),
        ("usr/share/doc/nano/AUTHORS".into(), b"Chris Allegretta\n".to_vec()),
        ("usr/share/doc/nano/NEWS".into(), b"GNU nano 4.6 - 2019.11.30\n".to_vec()),
        ("usr/share/man/man1/nano.1".into(), b".TH NANO 1 \"version 4.6\"\n".to_vec()),
        ("usr/share/nano/c.nanorc".into(), b"syntax c \"\\.(c|h)$\"\n".to_vec()),
        ("usr/share/nano/obsolete.nanorc".into(), b"syntax obsolete\n".to_vec()),
    ]
}

pub fn new_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("usr/bin/nano".into(), binary(b"nano 4.7", 8192)),
        ("usr/share/doc/nano/AUTHORS".into(), b"Chris Allegretta\n".to_vec()),
        ("usr/share/doc/nano/NEWS".into(), b"GNU nano 4.7 - 2019.12.31\n".to_vec()),
        ("usr/share/man/man1/nano.1".into(), b".TH NANO 1 \"version 4.7\"\n".to_vec()),
        ("usr/share/nano/c.nanorc".into(), b"syntax c \"\\.(c|h)$\"\n".to_vec()),
        ("usr/share/nano/rust.nanorc".into(), b"syntax rust \"\\.rs$\"\n".to_vec()),
    ]
}

/// Repetitive pseudo-binary content, so compression has something to do.
pub fn binary(seed: &[u8], len: usize) -> Vec<u8> {
    seed.iter().copied().cycle().take(len).collect()
}

pub fn write_package(
    path: &Path,
    meta: &PackageMeta,
    files: &[(String, Vec<u8>)],
    compression: &PayloadCompression,
) -> PathBuf {
    let mut files: Vec<&(String, Vec<u8>)> = files.iter().collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let file = AtomicFile::create(path).unwrap();
    let mut w = PackageWriter::new(file, meta, None, compression).unwrap();
    for (name, data) in files {
        w.add_entry(name, data).unwrap();
    }
    let (file, _) = w.finish().unwrap();
    file.commit().unwrap()
}

/// Writes the 117 and 118 `nano` packages into `dir`.
pub fn nano_pair(dir: &Path, compression: &PayloadCompression) -> (PathBuf, PathBuf) {
    let old = write_package(&dir.join(OLD_PKG), &nano_meta("4.6", 117), &old_files(), compression);
    let new = write_package(&dir.join(NEW_PKG), &nano_meta("4.7", 118), &new_files(), compression);
    (old, new)
}
