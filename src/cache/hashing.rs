// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Content fingerprinting.
//!
//! All fingerprints are XXH3-128 digests rendered as fixed-length (32
//! character) lowercase hex. XXH3 is not cryptographic; the cache only
//! needs determinism and a low collision probability.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

/// Number of hex characters in every fingerprint.
pub const HASH_LEN: usize = 32;

const READ_BUF: usize = 64 * 1024;

/// Hashes a byte slice.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = xxhash_rust::xxh3::xxh3_128(bytes);
    hex::encode(digest.to_be_bytes())
}

/// Hashes a file's contents without loading it whole.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(READ_BUF, File::open(path)?);
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.digest128().to_be_bytes()))
}

/// Hashes a normalized path string, producing the on-disk entry name for
/// that path.
#[must_use]
pub fn hash_path(path: &Path) -> String {
    hash_bytes(path.to_string_lossy().as_bytes())
}

/// Fingerprints a directory's direct children.
///
/// The input must be the sorted list of `(name, is_dir)` pairs; adding,
/// deleting or renaming a child, or a child changing kind, all produce a
/// different fingerprint.
#[must_use]
pub fn hash_children(children: &[(String, bool)]) -> String {
    let mut hasher = Xxh3::new();
    for (name, is_dir) in children {
        hasher.update(name.as_bytes());
        hasher.update(if *is_dir { b"/D" } else { b"/F" });
        hasher.update(b"\n");
    }
    hex::encode(hasher.digest128().to_be_bytes())
}
