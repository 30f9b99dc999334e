//! Archive fixtures written on the fly.
//!
//! Legacy zip methods cannot be produced by any maintained encoder, so
//! [`legacy_zip`] writes a Stored archive and patches the method field of
//! every local and central header. The payload stays stored; only the
//! declared method changes, which is all the classifier reads.

#![cfg_attr(
    not(test),
    expect(clippy::expect_used, reason = "test fixtures fail loudly")
)]

use crate::method::Method;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

const LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
const CENTRAL_HEADER: &[u8; 4] = b"PK\x01\x02";
const LOCAL_METHOD_OFFSET: usize = 8;
const CENTRAL_METHOD_OFFSET: usize = 10;

fn write_zip(path: &Path, entries: &[(&str, &[u8])], method: CompressionMethod) {
    let file = File::create(path).expect("create fixture zip");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, contents) in entries {
        writer.start_file(*name, options).expect("start fixture entry");
        writer.write_all(contents).expect("write fixture entry");
    }
    writer.finish().expect("finish fixture zip");
}

/// Writes a Deflated zip named `name` into `dir` and returns its path.
///
/// # Panics
///
/// Panics if the fixture cannot be written.
#[must_use]
pub fn modern_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    write_zip(&path, entries, CompressionMethod::Deflated);
    path
}

/// Writes a zip whose entries all declare `method` and returns its path.
///
/// # Panics
///
/// Panics if the fixture cannot be written or a header cannot be found.
#[must_use]
pub fn legacy_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])], method: Method) -> PathBuf {
    let path = dir.join(name);
    write_zip(&path, entries, CompressionMethod::Stored);

    let mut bytes = fs::read(&path).expect("read fixture zip");
    let code = method.code().to_le_bytes();
    let mut patched = 0;
    let mut offset = 0;
    while offset + 4 <= bytes.len() {
        let field = match &bytes[offset..offset + 4] {
            sig if sig == LOCAL_HEADER => Some(offset + LOCAL_METHOD_OFFSET),
            sig if sig == CENTRAL_HEADER => Some(offset + CENTRAL_METHOD_OFFSET),
            _ => None,
        };
        if let Some(field) = field {
            bytes[field..field + 2].copy_from_slice(&code);
            patched += 1;
        }
        offset += 1;
    }
    assert_eq!(patched, entries.len() * 2, "every header should be patched");

    fs::write(&path, bytes).expect("rewrite fixture zip");
    path
}

/// Writes a minimal SEA ARC file whose first header declares `method`.
///
/// The body is not a decodable archive; only the marker byte and method are
/// meaningful.
///
/// # Panics
///
/// Panics if the fixture cannot be written.
#[must_use]
pub fn arc_file(dir: &Path, name: &str, method: u8) -> PathBuf {
    let path = dir.join(name);
    let mut header = vec![0x1A, method];
    header.extend_from_slice(b"README.TXT\0\0\0");
    header.extend_from_slice(&[0; 16]);
    fs::write(&path, header).expect("write fixture arc");
    path
}

/// Writes `contents` to `relative` below `root`, creating parents.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture parent");
    }
    let mut file = File::create(&path).expect("create fixture file");
    file.write_all(contents).expect("write fixture file");
}
